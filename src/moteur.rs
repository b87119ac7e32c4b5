// src/moteur.rs
//
// Frontière avec le moteur mathématique (capacité opaque).
// - Operation : numérique ou simplification symbolique
// - Generic   : résultat paresseux ; render() peut encore échouer
// - Message   : diagnostic attaché à une évaluation réussie
// - Annulation: jeton d’interruption coopérative

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::erreur::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Numeric,
    Simplify,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Numeric => f.write_str("numeric"),
            Operation::Simplify => f.write_str("simplify"),
        }
    }
}

/// Résultat produit par le moteur. Le texte n’existe qu’après `render()`.
pub trait Generic: Send + fmt::Debug {
    fn render(&self) -> Result<String, EngineError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub text: String,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Warning,
            text: text.into(),
        }
    }
}

/// Jeton d’annulation partagé entre l’orchestrateur et le moteur.
#[derive(Clone, Debug, Default)]
pub struct Annulation {
    drapeau: Arc<AtomicBool>,
}

impl Annulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annuler(&self) {
        self.drapeau.store(true, Ordering::SeqCst);
    }

    pub fn est_annulee(&self) -> bool {
        self.drapeau.load(Ordering::SeqCst)
    }

    /// Point d’interruption : à appeler régulièrement par le moteur.
    pub fn verifier(&self) -> Result<(), EngineError> {
        if self.est_annulee() {
            Err(EngineError::Interrupted)
        } else {
            Ok(())
        }
    }
}

pub trait MathEngine: Send + Sync {
    fn evaluate(
        &self,
        expression: &str,
        operation: Operation,
        annulation: &Annulation,
    ) -> Result<Box<dyn Generic>, EngineError>;

    /// Messages de la dernière évaluation exécutée sur le thread appelant (vidés).
    fn drain_messages(&self) -> Result<Vec<Message>, EngineError>;
}
