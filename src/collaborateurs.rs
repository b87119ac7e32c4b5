// src/collaborateurs.rs
//
// Collaborateurs externes (interfaces seulement) + implémentations mémoire.
// Préférences, éditeur, affichage, historique : le moteur ne les modifie
// que par apply() après une action d’historique ; le reste passe par le bus.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::bases::NumeralBase;
use crate::erreur::CollaboratorError;

/* ------------------------ États ------------------------ */

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditorState {
    pub text: String,
    pub cursor: usize,
}

impl EditorState {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub text: String,
    pub valid: bool,
    pub error: Option<String>,
}

impl DisplayState {
    pub fn resultat(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            valid: true,
            error: None,
        }
    }

    pub fn erreur(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            valid: false,
            error: Some(message.into()),
        }
    }

    /// Résultat affichable, si l’état est valide et non vide.
    pub fn string_result(&self) -> Option<&str> {
        let t = self.text.trim();
        (self.valid && !t.is_empty()).then_some(t)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub editor: EditorState,
    pub display: DisplayState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HistoryAction {
    Undo,
    Redo,
}

/* ------------------------ Interfaces ------------------------ */

pub trait Preferences: Send + Sync {
    fn numeral_base(&self) -> NumeralBase;
    fn live_evaluation(&self) -> bool;
    /// Revalide les préférences moteur recommandées (appel périodique).
    fn check_preferred_preferences(&self) -> Result<(), CollaboratorError>;
}

pub trait Editeur: Send + Sync {
    fn state(&self) -> EditorState;
    fn apply(&self, state: EditorState);
}

pub trait Affichage: Send + Sync {
    fn state(&self) -> DisplayState;
    fn apply(&self, state: DisplayState);
}

pub trait Historique: Send + Sync {
    fn is_action_available(&self, action: HistoryAction) -> bool;
    fn do_action(&self, action: HistoryAction, courant: HistoryState) -> Option<HistoryState>;
    fn add_state(&self, state: HistoryState);
}

/* ------------------------ Implémentations mémoire ------------------------ */

/// Préférences fixes ; compte les revalidations.
#[derive(Debug)]
pub struct PreferencesFixes {
    base: RwLock<NumeralBase>,
    live: RwLock<bool>,
    verifications: AtomicUsize,
    echec: RwLock<Option<String>>,
}

impl PreferencesFixes {
    pub fn new(base: NumeralBase, live: bool) -> Self {
        Self {
            base: RwLock::new(base),
            live: RwLock::new(live),
            verifications: AtomicUsize::new(0),
            echec: RwLock::new(None),
        }
    }

    pub fn set_numeral_base(&self, base: NumeralBase) {
        *self.base.write() = base;
    }

    pub fn set_live_evaluation(&self, live: bool) {
        *self.live.write() = live;
    }

    /// Fait échouer les revalidations suivantes (tests).
    pub fn faire_echouer(&self, message: impl Into<String>) {
        *self.echec.write() = Some(message.into());
    }

    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl Default for PreferencesFixes {
    fn default() -> Self {
        Self::new(NumeralBase::Dec, true)
    }
}

impl Preferences for PreferencesFixes {
    fn numeral_base(&self) -> NumeralBase {
        *self.base.read()
    }

    fn live_evaluation(&self) -> bool {
        *self.live.read()
    }

    fn check_preferred_preferences(&self) -> Result<(), CollaboratorError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        match self.echec.read().as_ref() {
            Some(m) => Err(CollaboratorError(m.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct EditeurMemoire {
    state: RwLock<EditorState>,
}

impl Editeur for EditeurMemoire {
    fn state(&self) -> EditorState {
        self.state.read().clone()
    }

    fn apply(&self, state: EditorState) {
        *self.state.write() = state;
    }
}

#[derive(Debug, Default)]
pub struct AffichageMemoire {
    state: RwLock<DisplayState>,
}

impl Affichage for AffichageMemoire {
    fn state(&self) -> DisplayState {
        self.state.read().clone()
    }

    fn apply(&self, state: DisplayState) {
        *self.state.write() = state;
    }
}

/// Historique linéaire : pile d’états + curseur.
#[derive(Debug, Default)]
pub struct HistoriqueMemoire {
    interne: Mutex<(Vec<HistoryState>, usize)>,
}

impl Historique for HistoriqueMemoire {
    fn is_action_available(&self, action: HistoryAction) -> bool {
        let g = self.interne.lock();
        let (etats, pos) = (&g.0, g.1);
        match action {
            HistoryAction::Undo => pos > 1,
            HistoryAction::Redo => pos < etats.len(),
        }
    }

    fn do_action(&self, action: HistoryAction, _courant: HistoryState) -> Option<HistoryState> {
        let mut g = self.interne.lock();
        match action {
            HistoryAction::Undo if g.1 > 1 => {
                g.1 -= 1;
                g.0.get(g.1 - 1).cloned()
            }
            HistoryAction::Redo if g.1 < g.0.len() => {
                g.1 += 1;
                g.0.get(g.1 - 1).cloned()
            }
            _ => None,
        }
    }

    fn add_state(&self, state: HistoryState) {
        let mut g = self.interne.lock();
        let pos = g.1;
        g.0.truncate(pos);
        if g.0.last() == Some(&state) {
            return;
        }
        g.0.push(state);
        g.1 = g.0.len();
    }
}
