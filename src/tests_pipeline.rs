//! Tests du pipeline complet : moteur d’évaluation + bus + moteur exact.
//!
//! - écouteur enregistreur (ordre de livraison)
//! - doublures de moteur : scriptée, lente (annulation coopérative)
//! - attente déterministe : attendre_inactivite()

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::bases::NumeralBase;
use crate::calculatrice::{Contexte, EvaluationEngine};
use crate::collaborateurs::{
    DisplayState, EditorState, HistoryAction, HistoryState, PreferencesFixes,
};
use crate::config::Configuration;
use crate::erreur::{ConversionError, EngineError};
use crate::evenements::{Change, Ecouteur, EventData, Evenement, NatureEchec};
use crate::moteur::{Annulation, Generic, MathEngine, Message, Operation};
use crate::noyau::MoteurExact;
use crate::variables::{Variable, ANS};

/* ------------------------ Outils ------------------------ */

#[derive(Default)]
struct Enregistreur {
    recus: Mutex<Vec<(EventData, Evenement)>>,
}

impl Ecouteur for Enregistreur {
    fn on_event(&self, data: &EventData, ev: &Evenement) {
        self.recus.lock().push((*data, ev.clone()));
    }
}

impl Enregistreur {
    fn tous(&self) -> Vec<(EventData, Evenement)> {
        self.recus.lock().clone()
    }

    fn de_sequence(&self, seq: u64) -> Vec<Evenement> {
        self.recus
            .lock()
            .iter()
            .filter(|(d, _)| d.sequence_id == seq)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

fn config() -> Configuration {
    let mut c = Configuration::default();
    c.set_taille_pool(2);
    c.evaluation_live = false;
    c
}

fn monter(contexte: Contexte, config: &Configuration) -> (EvaluationEngine, Arc<Enregistreur>) {
    let moteur = EvaluationEngine::new(contexte, config);
    let enr = Arc::new(Enregistreur::default());
    let ecouteur: Arc<dyn Ecouteur> = enr.clone();
    moteur.subscribe(ecouteur);
    (moteur, enr)
}

fn standard() -> (EvaluationEngine, Arc<Enregistreur>) {
    let c = config();
    monter(Contexte::en_memoire(&c), &c)
}

fn avec_base(base: NumeralBase) -> (EvaluationEngine, Arc<Enregistreur>) {
    let c = config();
    let ctx = Contexte::en_memoire(&c).avec_preferences(Arc::new(PreferencesFixes::new(base, false)));
    monter(ctx, &c)
}

fn resultats(evs: &[Evenement]) -> Vec<(Operation, String)> {
    evs.iter()
        .filter_map(|e| match e {
            Evenement::CalculationResult(o) => Some((o.operation, o.texte.clone())),
            _ => None,
        })
        .collect()
}

fn echecs(evs: &[Evenement]) -> Vec<crate::evenements::Echec> {
    evs.iter()
        .filter_map(|e| match e {
            Evenement::CalculationFailed(f) => Some(f.clone()),
            _ => None,
        })
        .collect()
}

fn compte(evs: &[Evenement], pred: impl Fn(&Evenement) -> bool) -> usize {
    evs.iter().filter(|e| pred(e)).count()
}

fn attendre_que(cond: impl Fn() -> bool) {
    let t0 = Instant::now();
    while !cond() {
        assert!(t0.elapsed() < Duration::from_secs(5), "condition jamais atteinte");
        thread::sleep(Duration::from_millis(1));
    }
}

/* ------------------------ Doublures de moteur ------------------------ */

#[derive(Debug)]
struct Texte(Result<String, EngineError>);

impl Generic for Texte {
    fn render(&self) -> Result<String, EngineError> {
        self.0.clone()
    }
}

type Script = dyn Fn(&str, Operation) -> Result<Texte, EngineError> + Send + Sync;

struct MoteurScripte {
    script: Box<Script>,
    messages: Result<Vec<Message>, EngineError>,
    appels: AtomicUsize,
}

impl MoteurScripte {
    fn new(
        script: impl Fn(&str, Operation) -> Result<Texte, EngineError> + Send + Sync + 'static,
        messages: Result<Vec<Message>, EngineError>,
    ) -> Self {
        Self {
            script: Box::new(script),
            messages,
            appels: AtomicUsize::new(0),
        }
    }
}

impl MathEngine for MoteurScripte {
    fn evaluate(&self, expression: &str, op: Operation, _: &Annulation) -> Result<Box<dyn Generic>, EngineError> {
        self.appels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new((self.script)(expression, op)?))
    }

    fn drain_messages(&self) -> Result<Vec<Message>, EngineError> {
        self.messages.clone()
    }
}

/// "lent" tourne jusqu’à annulation ; "bloque" attend `libere` sans regarder
/// le jeton, puis le vérifie ; le reste passe au moteur exact.
struct MoteurLent {
    exact: MoteurExact,
    demarre: AtomicBool,
    libere: AtomicBool,
}

impl MathEngine for MoteurLent {
    fn evaluate(&self, expression: &str, op: Operation, annulation: &Annulation) -> Result<Box<dyn Generic>, EngineError> {
        if expression == "bloque" {
            self.demarre.store(true, Ordering::SeqCst);
            while !self.libere.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            annulation.verifier()?;
            return Ok(Box::new(Texte(Ok("fini".into()))));
        }
        if expression != "lent" {
            return self.exact.evaluate(expression, op, annulation);
        }
        self.demarre.store(true, Ordering::SeqCst);
        loop {
            annulation.verifier()?;
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn drain_messages(&self) -> Result<Vec<Message>, EngineError> {
        self.exact.drain_messages()
    }
}

fn avec_moteur_lent(live: bool) -> (EvaluationEngine, Arc<Enregistreur>, Arc<MoteurLent>) {
    let mut c = config();
    c.evaluation_live = live;
    let ctx = Contexte::en_memoire(&c);
    let lent = Arc::new(MoteurLent {
        exact: MoteurExact::new(ctx.variables.clone(), &c),
        demarre: AtomicBool::new(false),
        libere: AtomicBool::new(false),
    });
    let (m, enr) = monter(ctx.avec_moteur(lent.clone()), &c);
    (m, enr, lent)
}

/* ------------------------ Calcul ------------------------ */

#[test]
fn deux_plus_deux() {
    let (m, enr) = standard();
    let d = m.evaluate_numeric("2+2");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(resultats(&evs), vec![(Operation::Numeric, "4".to_string())]);
    assert!(echecs(&evs).is_empty());
    match &evs[0] {
        Evenement::CalculationResult(o) => assert_eq!(o.expression, "2+2"),
        autre => panic!("inattendu: {autre:?}"),
    }
}

#[test]
fn entree_vide_sans_pool() {
    let c = config();
    let scripte = Arc::new(MoteurScripte::new(|_, _| Ok(Texte(Ok("?".into()))), Ok(Vec::new())));
    let (m, enr) = monter(Contexte::en_memoire(&c).avec_moteur(scripte.clone()), &c);

    let d = m.evaluate_numeric("   ");
    // publié avant le retour : le bus suffit
    m.bus().flush();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(evs.len(), 1);
    assert!(matches!(&evs[0], Evenement::CalculationResult(o) if o.is_empty()));
    m.attendre_inactivite();
    assert_eq!(scripte.appels.load(Ordering::SeqCst), 0);
}

#[test]
fn variable_indefinie_reprise_meme_sequence() {
    let (m, enr) = standard();
    let d = m.evaluate_numeric("x+1");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    // une seule issue, en simplification, dans la même séquence
    assert_eq!(resultats(&evs), vec![(Operation::Simplify, "x+1".to_string())]);
    assert!(echecs(&evs).is_empty());

    let sequences: std::collections::HashSet<u64> = enr
        .tous()
        .iter()
        .filter(|(_, e)| matches!(e, Evenement::CalculationResult(_) | Evenement::CalculationFailed(_)))
        .map(|(d, _)| d.sequence_id)
        .collect();
    assert_eq!(sequences.len(), 1);
}

#[test]
fn chiffre_hors_base_reprise_puis_echec() {
    let (m, enr) = avec_base(NumeralBase::Bin);
    let d = m.evaluate_numeric("1012+1");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    let f = echecs(&evs);
    assert_eq!(f.len(), 1);
    // la reprise (simplification) échoue aussi : échec terminal
    assert_eq!(f[0].operation, Operation::Simplify);
    assert_eq!(f[0].nature, NatureEchec::NumeralBase);
    assert!(resultats(&evs).is_empty());
}

#[test]
fn chiffre_hors_base_sans_litteral_avant() {
    for (base, saisie) in [
        (NumeralBase::Bin, "2+1"),
        (NumeralBase::Bin, "(2)"),
        (NumeralBase::Bin, "2.5"),
        (NumeralBase::Oct, "9"),
    ] {
        let (m, enr) = avec_base(base);
        let d = m.evaluate_numeric(saisie);
        m.attendre_inactivite();

        let evs = enr.de_sequence(d.sequence_id);
        assert!(resultats(&evs).is_empty(), "{base} {saisie:?} : {evs:?}");
        let f = echecs(&evs);
        assert_eq!(f.len(), 1, "{base} {saisie:?} : {evs:?}");
        assert_eq!(f[0].operation, Operation::Simplify);
        assert_eq!(f[0].nature, NatureEchec::NumeralBase);
    }
}

#[test]
fn base_hexadecimale() {
    let (m, enr) = avec_base(NumeralBase::Hex);
    let d = m.evaluate_numeric("1F+1");
    m.attendre_inactivite();
    assert_eq!(
        resultats(&enr.de_sequence(d.sequence_id)),
        vec![(Operation::Numeric, "32".to_string())]
    );
}

#[test]
fn erreurs_terminales() {
    let (m, enr) = standard();

    // erreur paresseuse : levée par render()
    let d = m.evaluate_numeric("1/(2-2)");
    let p = m.evaluate_numeric("(2");
    let s = m.evaluate_numeric(&("-".repeat(600) + "1"));
    m.attendre_inactivite();

    let f = echecs(&enr.de_sequence(d.sequence_id));
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].nature, NatureEchec::Arithmetic);

    let f = echecs(&enr.de_sequence(p.sequence_id));
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].nature, NatureEchec::Parse);
    assert_eq!(f[0].span, Some(0..1));

    let f = echecs(&enr.de_sequence(s.sequence_id));
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].nature, NatureEchec::TooComplex);
    assert_eq!(f[0].message, "expression trop complexe");
}

#[test]
fn messages_avant_resultat() {
    let (m, enr) = standard();
    let d = m.evaluate_numeric("1/3");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(evs.len(), 2);
    assert!(matches!(&evs[0], Evenement::CalculationMessages(ms) if ms.len() == 1));
    assert!(matches!(&evs[1], Evenement::CalculationResult(_)));
}

#[test]
fn echec_de_lecture_des_messages_ignore() {
    let c = config();
    let scripte = Arc::new(MoteurScripte::new(
        |_, _| Ok(Texte(Ok("42".into()))),
        Err(EngineError::Internal("registre indisponible".into())),
    ));
    let (m, enr) = monter(Contexte::en_memoire(&c).avec_moteur(scripte), &c);

    let d = m.evaluate_numeric("6*7");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(resultats(&evs), vec![(Operation::Numeric, "42".to_string())]);
    assert!(echecs(&evs).is_empty());
    assert_eq!(compte(&evs, |e| matches!(e, Evenement::CalculationMessages(_))), 0);
}

#[test]
fn erreur_au_rendu_du_moteur_externe() {
    let c = config();
    let scripte = Arc::new(MoteurScripte::new(
        |_, _| Ok(Texte(Err(EngineError::Arithmetic("dépassement".into())))),
        Ok(Vec::new()),
    ));
    let (m, enr) = monter(Contexte::en_memoire(&c).avec_moteur(scripte), &c);

    let d = m.evaluate_numeric("2^2");
    m.attendre_inactivite();

    let f = echecs(&enr.de_sequence(d.sequence_id));
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].message, "dépassement");
}

#[test]
fn panique_du_moteur_echec_unique() {
    let c = config();
    let scripte = Arc::new(MoteurScripte::new(
        |_, _| -> Result<Texte, EngineError> { panic!("moteur cassé") },
        Ok(Vec::new()),
    ));
    let (m, enr) = monter(Contexte::en_memoire(&c).avec_moteur(scripte), &c);

    let d = m.evaluate_numeric("2+2");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(evs.len(), 1, "{evs:?}");
    let f = echecs(&evs);
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].nature, NatureEchec::Engine);
    // jeton rendu : la chaîne est close
    assert!(!m.cancel(d.sequence_id));

    // le pool survit
    let d = m.evaluate_numeric("1+1");
    m.attendre_inactivite();
    assert_eq!(echecs(&enr.de_sequence(d.sequence_id)).len(), 1);
}

/* ------------------------ Annulation ------------------------ */

#[test]
fn auto_interruption_un_seul_evenement_annule() {
    let c = config();
    let scripte = Arc::new(MoteurScripte::new(|_, _| Err(EngineError::Interrupted), Ok(Vec::new())));
    let (m, enr) = monter(Contexte::en_memoire(&c).avec_moteur(scripte), &c);

    // même avec une variable indéfinie : pas de reprise
    let d = m.evaluate_numeric("x+1");
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(evs, vec![Evenement::CalculationCancelled]);
}

#[test]
fn annulation_en_cours() {
    let (m, enr, lent) = avec_moteur_lent(false);
    let d = m.evaluate_numeric("lent");
    attendre_que(|| lent.demarre.load(Ordering::SeqCst));

    assert!(m.cancel(d.sequence_id));
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(compte(&evs, |e| matches!(e, Evenement::CalculationCancelled)), 1);
    assert!(echecs(&evs).is_empty());
    // chaîne terminée : plus rien à annuler
    assert!(!m.cancel(d.sequence_id));
}

#[test]
fn nouveau_calcul_apres_annulation_de_la_sequence() {
    let (m, enr, lent) = avec_moteur_lent(false);
    let d = m.evaluate_numeric("bloque");
    attendre_que(|| lent.demarre.load(Ordering::SeqCst));
    let seq = d.sequence_id;

    // la première chaîne est annulée mais tourne encore
    assert!(m.cancel(seq));
    m.evaluate_in_sequence(Operation::Numeric, "2+2", seq);
    attendre_que(|| !resultats(&enr.de_sequence(seq)).is_empty());

    lent.libere.store(true, Ordering::SeqCst);
    m.attendre_inactivite();

    let evs = enr.de_sequence(seq);
    assert_eq!(resultats(&evs), vec![(Operation::Numeric, "4".to_string())]);
    assert_eq!(compte(&evs, |e| matches!(e, Evenement::CalculationCancelled)), 1);
    assert!(echecs(&evs).is_empty());
}

/* ------------------------ Réactions ------------------------ */

#[test]
fn evaluation_live_remplace_la_precedente() {
    let (m, enr, lent) = avec_moteur_lent(true);

    let d1 = m.fire(Evenement::EditorStateChanged(Change {
        old: EditorState::default(),
        new: EditorState::new("lent"),
    }));
    attendre_que(|| lent.demarre.load(Ordering::SeqCst));

    let d2 = m.fire(Evenement::EditorStateChanged(Change {
        old: EditorState::new("lent"),
        new: EditorState::new("2+2"),
    }));
    m.attendre_inactivite();

    let evs1 = enr.de_sequence(d1.sequence_id);
    assert_eq!(compte(&evs1, |e| matches!(e, Evenement::CalculationCancelled)), 1);
    assert!(resultats(&evs1).is_empty());

    let evs2 = enr.de_sequence(d2.sequence_id);
    assert_eq!(resultats(&evs2), vec![(Operation::Numeric, "4".to_string())]);
}

#[test]
fn sans_live_pas_de_calcul() {
    let (m, enr) = standard();
    m.set_live_evaluation(true);
    assert!(!m.live_evaluation(), "préférences : live désactivé");

    let d = m.fire(Evenement::EditorStateChanged(Change {
        old: EditorState::default(),
        new: EditorState::new("1+1"),
    }));
    m.attendre_inactivite();
    assert_eq!(enr.de_sequence(d.sequence_id).len(), 1);
}

#[test]
fn texte_inchange_pas_de_calcul() {
    let (m, enr, _) = avec_moteur_lent(true);
    let d = m.fire(Evenement::EditorStateChanged(Change {
        old: EditorState::new("1+1"),
        new: EditorState { text: "1+1".into(), cursor: 0 },
    }));
    m.attendre_inactivite();
    assert_eq!(enr.de_sequence(d.sequence_id).len(), 1);
}

#[test]
fn affichage_met_a_jour_ans() {
    let (m, enr) = standard();
    m.fire(Evenement::DisplayStateChanged(Change {
        old: DisplayState::default(),
        new: DisplayState::resultat("4"),
    }));
    m.attendre_inactivite();

    let ans = m.contexte().variables.get(ANS).map(|v| v.value);
    assert_eq!(ans.as_deref(), Some("4"));
    // ans ne relance pas de calcul
    let evs: Vec<Evenement> = enr.tous().into_iter().map(|(_, e)| e).collect();
    assert_eq!(compte(&evs, |e| matches!(e, Evenement::ConstantAdded(v) if v.name == ANS)), 1);
    assert_eq!(compte(&evs, |e| matches!(e, Evenement::ManualCalculationRequested(_))), 0);

    // affichage invalide : ans intact
    m.fire(Evenement::DisplayStateChanged(Change {
        old: DisplayState::resultat("4"),
        new: DisplayState::erreur("division par zéro"),
    }));
    let d = m.evaluate_numeric("ans*2");
    m.attendre_inactivite();
    assert_eq!(
        resultats(&enr.de_sequence(d.sequence_id)),
        vec![(Operation::Numeric, "8".to_string())]
    );
}

#[test]
fn constante_ajoutee_relance_l_editeur() {
    let (m, enr) = standard();
    m.contexte().editeur.apply(EditorState::new("a+1"));
    let a = Variable::new("a", "2");
    m.contexte().variables.save(a.clone());

    let d = m.fire(Evenement::ConstantAdded(a));
    m.attendre_inactivite();

    // la demande manuelle ouvre sa propre chaîne
    let tous = enr.tous();
    let (dm, etat) = tous
        .iter()
        .find_map(|(d, e)| match e {
            Evenement::ManualCalculationRequested(s) => Some((*d, s.clone())),
            _ => None,
        })
        .unwrap_or_else(|| panic!("aucune demande manuelle après {d}"));
    assert_eq!(etat.text, "a+1");
    assert_eq!(
        resultats(&enr.de_sequence(dm.sequence_id)),
        vec![(Operation::Numeric, "3".to_string())]
    );
}

#[test]
fn preferences_moteur_changees_meme_sequence() {
    let (m, enr) = standard();
    m.contexte().editeur.apply(EditorState::new("3*3"));

    let d = m.fire(Evenement::EnginePreferencesChanged);
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(compte(&evs, |e| matches!(e, Evenement::ManualCalculationRequested(_))), 1);
    assert_eq!(resultats(&evs), vec![(Operation::Numeric, "9".to_string())]);
}

#[test]
fn simplification_de_l_editeur() {
    let (m, enr) = standard();
    m.contexte().editeur.apply(EditorState::new("sqrt(8)/4"));
    let d = m.simplify_editor();
    m.attendre_inactivite();
    assert_eq!(
        resultats(&enr.de_sequence(d.sequence_id)),
        vec![(Operation::Simplify, "√2/2".to_string())]
    );
}

/* ------------------------ Préférences ------------------------ */

#[test]
fn verification_des_preferences_periodique() {
    let c = config();
    let prefs = Arc::new(PreferencesFixes::new(NumeralBase::Dec, false));
    prefs.faire_echouer("service indisponible");
    let ctx = Contexte::en_memoire(&c).avec_preferences(prefs.clone());
    let (m, enr) = monter(ctx, &c);

    let d1 = m.evaluate_numeric("1+1");
    m.attendre_inactivite();
    let d2 = m.evaluate_numeric("2+2");
    m.attendre_inactivite();

    // intervalle d’une minute : une seule vérification
    assert_eq!(prefs.verifications(), 1);
    // et son échec ne fait pas échouer les calculs
    assert_eq!(resultats(&enr.de_sequence(d1.sequence_id)).len(), 1);
    assert_eq!(resultats(&enr.de_sequence(d2.sequence_id)).len(), 1);
}

/* ------------------------ Conversion ------------------------ */

#[test]
fn conversion_vers_hex() {
    let (m, enr) = standard();
    let d = m.convert("255", NumeralBase::Hex);
    let e = m.convert("1.5", NumeralBase::Hex);
    m.attendre_inactivite();

    let evs = enr.de_sequence(d.sequence_id);
    assert_eq!(evs.len(), 2);
    assert!(matches!(&evs[0], Evenement::ConversionStarted(c) if c.from == NumeralBase::Dec));
    assert!(matches!(&evs[1], Evenement::ConversionResult { texte, .. } if texte == "FF"));

    let evs = enr.de_sequence(e.sequence_id);
    assert!(matches!(
        evs.last(),
        Some(Evenement::ConversionFailed { erreur: ConversionError::NotAnInteger(_), .. })
    ));

    assert!(m.is_conversion_possible("0x:1F", NumeralBase::Dec, NumeralBase::Bin));
    assert!(!m.is_conversion_possible("12", NumeralBase::Bin, NumeralBase::Dec));
}

/* ------------------------ Historique ------------------------ */

#[test]
fn action_d_historique_applique_l_etat() {
    let (m, _) = standard();
    let etat = |t: &str, r: &str| HistoryState {
        editor: EditorState::new(t),
        display: DisplayState::resultat(r),
    };
    let h = &m.contexte().historique;
    h.add_state(etat("1+1", "2"));
    h.add_state(etat("2+2", "4"));
    m.contexte().editeur.apply(EditorState::new("2+2"));

    assert!(m.do_history_action(HistoryAction::Undo));
    assert_eq!(m.current_history_state(), etat("1+1", "2"));

    assert!(m.do_history_action(HistoryAction::Redo));
    assert_eq!(m.current_history_state().editor.text, "2+2");
    // plus rien à refaire
    assert!(!m.do_history_action(HistoryAction::Redo));
}

/* ------------------------ Identifiants ------------------------ */

#[test]
fn identifiants_uniques_entre_threads() {
    let (m, _) = standard();
    let moteur = &m;
    let ids: Vec<u64> = thread::scope(|s| {
        let poignees: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || {
                    (0..25)
                        .map(|_| moteur.evaluate_numeric("1").event_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        poignees
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });
    m.attendre_inactivite();

    let uniques: std::collections::HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(uniques.len(), 100);
}
