// src/calculatrice.rs
//
// Moteur d’évaluation : orchestration asynchrone des calculs.
//
// - evaluate/simplify/convert rendent un EventData tout de suite ; le résultat
//   arrive par le bus, jamais par une valeur de retour
// - thread d’évaluation : préférences (périodique) -> prétraitement -> moteur
//   -> render() forcé -> messages (au mieux) -> résultat
// - reprise en simplification, même séquence, un seul saut :
//   variable non définie, ou chiffre hors base
// - Interrupted => CalculationCancelled, rien d’autre
// - le moteur écoute le bus : édition (live), affichage (ans), constantes…

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::bases::{convert_integer, NumeralBase};
use crate::bus::EventBus;
use crate::collaborateurs::{
    Affichage, AffichageMemoire, EditeurMemoire, Editeur, Historique, HistoriqueMemoire,
    HistoryAction, HistoryState, Preferences, PreferencesFixes,
};
use crate::config::Configuration;
use crate::erreur::{EngineError, ParseError};
use crate::evenements::{
    CalculatorOutput, Change, Conversion, Echec, Ecouteur, EventData, Evenement,
};
use crate::moteur::{Annulation, MathEngine, Operation};
use crate::noyau::MoteurExact;
use crate::pool::PoolEvaluation;
use crate::pretraitement::{ExpressionPreprocessor, PreparedExpression};
use crate::variables::{Variable, VarsRegistry, ANS};

/* ------------------------ Contexte ------------------------ */

/// Sous-systèmes partagés, construits une fois et injectés.
#[derive(Clone)]
pub struct Contexte {
    pub moteur: Arc<dyn MathEngine>,
    pub preferences: Arc<dyn Preferences>,
    pub historique: Arc<dyn Historique>,
    pub editeur: Arc<dyn Editeur>,
    pub affichage: Arc<dyn Affichage>,
    pub variables: Arc<VarsRegistry>,
}

impl Contexte {
    /// Moteur exact intégré + collaborateurs en mémoire.
    pub fn en_memoire(config: &Configuration) -> Self {
        let variables = Arc::new(VarsRegistry::with_defaults());
        Self {
            moteur: Arc::new(MoteurExact::new(variables.clone(), config)),
            preferences: Arc::new(PreferencesFixes::new(NumeralBase::Dec, config.evaluation_live)),
            historique: Arc::new(HistoriqueMemoire::default()),
            editeur: Arc::new(EditeurMemoire::default()),
            affichage: Arc::new(AffichageMemoire::default()),
            variables,
        }
    }

    /// Remplace le moteur mathématique (moteur externe, doublure de test…).
    pub fn avec_moteur(mut self, moteur: Arc<dyn MathEngine>) -> Self {
        self.moteur = moteur;
        self
    }

    pub fn avec_preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
        self.preferences = preferences;
        self
    }
}

/* ------------------------ Moteur d’évaluation ------------------------ */

pub struct EvaluationEngine {
    interne: Arc<Interne>,
}

struct Interne {
    contexte: Contexte,
    preprocesseur: ExpressionPreprocessor,
    bus: EventBus,
    pool: PoolEvaluation,

    live: AtomicBool,
    intervalle_preferences: Duration,
    derniere_verification: Mutex<Option<Instant>>,

    /// Jetons d’annulation par séquence (jeton, chaînes en cours).
    annulations: Mutex<HashMap<u64, (Annulation, usize)>>,
    /// Séquence de la dernière évaluation live (remplacée par la suivante).
    chaine_live: Mutex<Option<u64>>,
}

/// Écouteur du moteur sur son propre bus (lien faible : pas de cycle).
struct Reacteur {
    interne: Weak<Interne>,
}

impl Ecouteur for Reacteur {
    fn on_event(&self, data: &EventData, evenement: &Evenement) {
        if let Some(interne) = self.interne.upgrade() {
            interne.reagir(data, evenement);
        }
    }
}

impl EvaluationEngine {
    pub fn new(contexte: Contexte, config: &Configuration) -> Self {
        let preprocesseur =
            ExpressionPreprocessor::new(contexte.variables.clone(), contexte.preferences.clone());
        let interne = Arc::new(Interne {
            contexte,
            preprocesseur,
            bus: EventBus::new(),
            pool: PoolEvaluation::new(config.taille_pool),
            live: AtomicBool::new(config.evaluation_live),
            intervalle_preferences: config.intervalle_preferences,
            derniere_verification: Mutex::new(None),
            annulations: Mutex::new(HashMap::new()),
            chaine_live: Mutex::new(None),
        });

        let reacteur: Arc<dyn Ecouteur> = Arc::new(Reacteur {
            interne: Arc::downgrade(&interne),
        });
        interne.bus.subscribe(reacteur);

        info!(taille_pool = config.taille_pool, chiffres = config.chiffres, "moteur d’évaluation prêt");
        Self { interne }
    }

    pub fn contexte(&self) -> &Contexte {
        &self.interne.contexte
    }

    pub fn bus(&self) -> &EventBus {
        &self.interne.bus
    }

    pub fn subscribe(&self, ecouteur: Arc<dyn Ecouteur>) {
        self.interne.bus.subscribe(ecouteur);
    }

    pub fn unsubscribe(&self, ecouteur: &Arc<dyn Ecouteur>) -> bool {
        self.interne.bus.unsubscribe(ecouteur)
    }

    /// Publie un événement de collaborateur (éditeur, affichage, constantes…).
    pub fn fire(&self, evenement: Evenement) -> EventData {
        self.interne.bus.fire(evenement)
    }

    pub fn fire_in_sequence(&self, sequence_id: u64, evenement: Evenement) -> EventData {
        self.interne.bus.fire_in_sequence(sequence_id, evenement)
    }

    /* ---------- calcul ---------- */

    /// Nouvelle chaîne de calcul.
    pub fn evaluate(&self, operation: Operation, texte: &str) -> EventData {
        let data = self.interne.bus.next_event_data();
        self.interne.soumettre(data, operation, texte);
        data
    }

    /// Calcul rattaché à une chaîne existante.
    pub fn evaluate_in_sequence(&self, operation: Operation, texte: &str, sequence_id: u64) -> EventData {
        let data = self.interne.bus.next_in_sequence(sequence_id);
        self.interne.soumettre(data, operation, texte);
        data
    }

    pub fn evaluate_numeric(&self, texte: &str) -> EventData {
        self.evaluate(Operation::Numeric, texte)
    }

    pub fn simplify(&self, texte: &str) -> EventData {
        self.evaluate(Operation::Simplify, texte)
    }

    /// Calcul numérique du texte de l’éditeur (demande manuelle).
    pub fn evaluate_editor(&self) -> EventData {
        self.interne.calcul_editeur(Operation::Numeric, None)
    }

    pub fn simplify_editor(&self) -> EventData {
        self.interne.calcul_editeur(Operation::Simplify, None)
    }

    /// Annule la chaîne : le moteur s’interrompt au prochain point de contrôle.
    /// Renvoie false si aucune évaluation de cette séquence n’est en cours.
    pub fn cancel(&self, sequence_id: u64) -> bool {
        self.interne.annuler(sequence_id)
    }

    pub fn prepare_expression(&self, texte: &str) -> Result<PreparedExpression, ParseError> {
        self.interne.preprocesseur.process(texte)
    }

    pub fn set_live_evaluation(&self, live: bool) {
        self.interne.live.store(live, Ordering::SeqCst);
    }

    pub fn live_evaluation(&self) -> bool {
        self.interne.live_active()
    }

    /* ---------- conversion ---------- */

    /// Conversion d’un entier de la base courante vers `to`.
    pub fn convert(&self, valeur: &str, to: NumeralBase) -> EventData {
        let data = self.interne.bus.next_event_data();
        let conversion = Conversion {
            value: valeur.to_string(),
            from: self.interne.contexte.preferences.numeral_base(),
            to,
        };

        let interne = self.interne.clone();
        self.interne.pool.execute(move || {
            let seq = data.sequence_id;
            interne
                .bus
                .fire_in_sequence(seq, Evenement::ConversionStarted(conversion.clone()));

            let evenement = match convert_integer(&conversion.value, conversion.from, conversion.to) {
                Ok(texte) => Evenement::ConversionResult { conversion, texte },
                Err(erreur) => {
                    debug!(sequence_id = seq, %erreur, "conversion refusée");
                    Evenement::ConversionFailed { conversion, erreur }
                }
            };
            interne.bus.fire_in_sequence(seq, evenement);
        });
        data
    }

    pub fn is_conversion_possible(&self, valeur: &str, from: NumeralBase, to: NumeralBase) -> bool {
        convert_integer(valeur, from, to).is_ok()
    }

    /* ---------- historique ---------- */

    pub fn current_history_state(&self) -> HistoryState {
        let c = &self.interne.contexte;
        HistoryState {
            editor: c.editeur.state(),
            display: c.affichage.state(),
        }
    }

    /// Applique l’action si l’historique la permet ; renvoie true si un état a été appliqué.
    pub fn do_history_action(&self, action: HistoryAction) -> bool {
        let historique = &self.interne.contexte.historique;
        if !historique.is_action_available(action) {
            return false;
        }
        match historique.do_action(action, self.current_history_state()) {
            Some(etat) => {
                self.interne.contexte.editeur.apply(etat.editor);
                self.interne.contexte.affichage.apply(etat.display);
                true
            }
            None => false,
        }
    }

    /// Attend que plus rien ne tourne : pool vide et bus livré.
    /// Les réactions du moteur peuvent relancer des calculs : on recommence
    /// tant qu’un tour a distribué de nouveaux identifiants.
    pub fn attendre_inactivite(&self) {
        let interne = &self.interne;
        loop {
            let avant = interne.bus.dernier_id();
            interne.pool.attendre();
            interne.bus.flush();
            if interne.pool.en_attente() == 0 && interne.bus.dernier_id() == avant {
                break;
            }
        }
    }
}

impl Interne {
    fn live_active(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.contexte.preferences.live_evaluation()
    }

    fn soumettre(self: &Arc<Self>, data: EventData, operation: Operation, texte: &str) {
        let seq = data.sequence_id;
        let texte = texte.trim().to_string();

        // texte vide : résultat vide immédiat, sans passer par le pool
        if texte.is_empty() {
            self.bus.fire_in_sequence(seq, Evenement::CalculationResult(CalculatorOutput::empty(operation)));
            return;
        }

        let annulation = self.prendre_jeton(seq);
        let interne = self.clone();
        self.pool.execute(move || {
            let issue = panic::catch_unwind(AssertUnwindSafe(|| {
                interne.calculer(seq, operation, &texte, &annulation)
            }));
            if issue.is_err() {
                // aucun événement terminal n’a pu partir : la chaîne se clôt ici
                error!(sequence_id = seq, %operation, "moteur en panique");
                let panne = EngineError::Internal("le moteur s’est arrêté brutalement".into());
                let echec = Echec::depuis_moteur(operation, &texte, &panne);
                interne.bus.fire_in_sequence(seq, Evenement::CalculationFailed(echec));
            }
            interne.rendre_jeton(seq);
        });
    }

    fn calcul_editeur(self: &Arc<Self>, operation: Operation, sequence_id: Option<u64>) -> EventData {
        let etat = self.contexte.editeur.state();
        let texte = etat.text.clone();
        let demande = Evenement::ManualCalculationRequested(etat);
        let seq = match sequence_id {
            Some(seq) => self.bus.fire_in_sequence(seq, demande).sequence_id,
            None => self.bus.fire(demande).sequence_id,
        };
        let data = self.bus.next_in_sequence(seq);
        self.soumettre(data, operation, &texte);
        data
    }

    /* ---------- annulation ---------- */

    fn prendre_jeton(&self, seq: u64) -> Annulation {
        let mut table = self.annulations.lock();
        let entree = table.entry(seq).or_insert_with(|| (Annulation::new(), 0));
        // la chaîne annulée garde son jeton ; la nouvelle repart d’un jeton neuf
        if entree.0.est_annulee() {
            entree.0 = Annulation::new();
        }
        entree.1 += 1;
        entree.0.clone()
    }

    fn rendre_jeton(&self, seq: u64) {
        let mut table = self.annulations.lock();
        if let Some(entree) = table.get_mut(&seq) {
            entree.1 -= 1;
            if entree.1 == 0 {
                table.remove(&seq);
            }
        }
    }

    fn annuler(&self, seq: u64) -> bool {
        match self.annulations.lock().get(&seq) {
            Some((jeton, _)) => {
                jeton.annuler();
                debug!(sequence_id = seq, "annulation demandée");
                true
            }
            None => false,
        }
    }

    /* ---------- thread d’évaluation ---------- */

    /// Revalide les préférences si l’intervalle est écoulé ; n’échoue jamais.
    fn verifier_preferences(&self) {
        {
            let mut derniere = self.derniere_verification.lock();
            let maintenant = Instant::now();
            let due = derniere.map_or(true, |t| maintenant.duration_since(t) > self.intervalle_preferences);
            if !due {
                return;
            }
            *derniere = Some(maintenant);
        }
        if let Err(e) = self.contexte.preferences.check_preferred_preferences() {
            warn!(erreur = %e, "revalidation des préférences impossible");
        }
    }

    fn calculer(&self, seq: u64, operation: Operation, texte: &str, annulation: &Annulation) {
        self.verifier_preferences();

        let prepared = match self.preprocesseur.process(texte) {
            Ok(p) => p,
            Err(e) => {
                debug!(sequence_id = seq, %operation, erreur = %e, "prétraitement refusé");
                let echec = Echec::depuis_parse(operation, texte, &e);
                self.bus.fire_in_sequence(seq, Evenement::CalculationFailed(echec));
                return;
            }
        };

        let moteur = &self.contexte.moteur;
        let resultat = moteur
            .evaluate(&prepared.expression, operation, annulation)
            // render() ici : les erreurs paresseuses sortent sur ce thread
            .and_then(|g| g.render());

        match resultat {
            Ok(texte_resultat) => {
                match moteur.drain_messages() {
                    Ok(messages) if !messages.is_empty() => {
                        self.bus.fire_in_sequence(seq, Evenement::CalculationMessages(messages));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(sequence_id = seq, erreur = %e, "lecture des messages du moteur impossible"),
                }

                debug!(sequence_id = seq, %operation, expression = %prepared, resultat = %texte_resultat, "calcul terminé");
                let sortie = CalculatorOutput {
                    operation,
                    expression: prepared.expression,
                    texte: texte_resultat,
                };
                self.bus.fire_in_sequence(seq, Evenement::CalculationResult(sortie));
            }

            Err(EngineError::Interrupted) => {
                debug!(sequence_id = seq, "calcul interrompu");
                self.bus.fire_in_sequence(seq, Evenement::CalculationCancelled);
            }

            Err(e) if doit_reprendre(operation, &prepared, &e) => {
                debug!(sequence_id = seq, erreur = %e, "reprise en simplification");
                self.calculer(seq, Operation::Simplify, texte, annulation);
            }

            Err(e) => {
                debug!(sequence_id = seq, %operation, erreur = %e, "calcul en échec");
                let echec = Echec::depuis_moteur(operation, &prepared.expression, &e);
                self.bus.fire_in_sequence(seq, Evenement::CalculationFailed(echec));
            }
        }
    }

    /* ---------- réactions aux événements ---------- */

    fn reagir(self: &Arc<Self>, data: &EventData, evenement: &Evenement) {
        match evenement {
            Evenement::EditorStateChanged(Change { old, new }) => {
                if self.live_active() && old.text != new.text {
                    self.calcul_live(data.sequence_id, &new.text);
                }
            }

            Evenement::DisplayStateChanged(Change { new, .. }) => {
                if let Some(resultat) = new.string_result() {
                    self.mettre_a_jour_ans(resultat);
                }
            }

            Evenement::ConstantChanged(Change { new, .. }) if new.name != ANS => {
                self.calcul_editeur(Operation::Numeric, None);
            }
            Evenement::ConstantAdded(v) | Evenement::ConstantRemoved(v) if v.name != ANS => {
                self.calcul_editeur(Operation::Numeric, None);
            }
            Evenement::FunctionAdded(_) | Evenement::FunctionChanged(_) | Evenement::FunctionRemoved(_) => {
                self.calcul_editeur(Operation::Numeric, None);
            }

            Evenement::EnginePreferencesChanged => {
                self.calcul_editeur(Operation::Numeric, Some(data.sequence_id));
            }

            _ => {}
        }
    }

    /// Évaluation live : la chaîne précédente est annulée.
    fn calcul_live(self: &Arc<Self>, seq: u64, texte: &str) {
        let precedente = self.chaine_live.lock().replace(seq);
        if let Some(p) = precedente.filter(|p| *p != seq) {
            self.annuler(p);
        }
        let data = self.bus.next_in_sequence(seq);
        self.soumettre(data, Operation::Numeric, texte);
    }

    fn mettre_a_jour_ans(&self, resultat: &str) {
        let variables = &self.contexte.variables;
        let ancienne = variables.get(ANS);
        if ancienne.as_ref().is_some_and(|v| v.value == resultat) {
            return;
        }

        let nouvelle = Variable::new(ANS, resultat).avec_description("dernier résultat");
        variables.save(nouvelle.clone());
        debug!(valeur = resultat, "ans mis à jour");

        let evenement = match ancienne {
            Some(old) => Evenement::ConstantChanged(Change { old, new: nouvelle }),
            None => Evenement::ConstantAdded(nouvelle),
        };
        self.bus.fire(evenement);
    }
}

/// Reprise en simplification : calcul numérique seulement, deux déclencheurs.
fn doit_reprendre(operation: Operation, prepared: &PreparedExpression, e: &EngineError) -> bool {
    if operation != Operation::Numeric {
        return false;
    }
    match e {
        EngineError::NumeralBaseMismatch { .. } | EngineError::UndefinedVariable(_) => true,
        _ => prepared.exists_undefined_var(),
    }
}
