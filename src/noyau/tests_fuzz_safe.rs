//! Tests fuzz safe : robustesse + déterminisme + limites contrôlées.
//!
//! But : marteler le pipeline sans brûler la machine.
//! - RNG déterministe (seed fixe)
//! - profondeur bornée
//! - budget temps global
//! - on accepte certaines erreurs attendues (division par zéro, racine négative…)
//! - invariant clé : la forme EXACT se relit, et garde la même valeur

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::MoteurExact;
use crate::bases::NumeralBase;
use crate::collaborateurs::PreferencesFixes;
use crate::config::Configuration;
use crate::erreur::EngineError;
use crate::moteur::{Annulation, MathEngine, Operation};
use crate::pretraitement::ExpressionPreprocessor;
use crate::variables::VarsRegistry;

/* ------------------------ RNG déterministe minimal ------------------------ */

#[derive(Clone)]
struct Rng {
    state: u64,
}
impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    fn next_u32(&mut self) -> u32 {
        // LCG simple (déterministe)
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }
    fn pick(&mut self, n: u32) -> u32 {
        if n == 0 {
            0
        } else {
            self.next_u32() % n
        }
    }
    fn coin(&mut self) -> bool {
        (self.next_u32() & 1) == 1
    }
}

/* ------------------------ Budget anti-gel ------------------------ */

fn budget(start: Instant, max: Duration) {
    if start.elapsed() > max {
        panic!("budget temps dépassé: {:?}", max);
    }
}

/* ------------------------ Helpers fuzz ------------------------ */

fn moteur() -> MoteurExact {
    MoteurExact::new(Arc::new(VarsRegistry::with_defaults()), &Configuration::default())
}

fn calc(m: &MoteurExact, s: &str, op: Operation) -> Result<String, EngineError> {
    m.evaluate(s, op, &Annulation::new())?.render()
}

fn is_erreur_attendue(e: &EngineError) -> bool {
    // Liste blanche : erreurs *normales* pour un fuzz, le domaine étant borné.
    match e {
        EngineError::Arithmetic(msg) => {
            msg.contains("division par zéro") || msg.contains("racine carrée")
        }
        _ => false,
    }
}

/* ------------------------ Génération d’expressions (bornée) ------------------------ */

fn gen_rat(rng: &mut Rng) -> String {
    // rationnels simples, incluant 0 (utile pour tester zéros)
    let a = rng.pick(8);
    // dénominateur jamais nul ici ; la division par zéro arrive via / expr
    let b = rng.pick(7) + 1;

    if rng.coin() {
        format!("{a}/{b}")
    } else {
        format!("{a}")
    }
}

fn gen_atom(rng: &mut Rng) -> String {
    match rng.pick(6) {
        0 | 1 => gen_rat(rng),
        2 => "pi".to_string(),
        3 => "sqrt(2)".to_string(),
        4 => "√3".to_string(),
        _ => format!("abs(-{})", gen_rat(rng)),
    }
}

/// Expressions rationnelles : + - * / ^ (exposant 0..3), moins unaire.
fn gen_rationnelle(rng: &mut Rng, depth: usize) -> String {
    if depth == 0 {
        return gen_rat(rng);
    }
    let a = gen_rationnelle(rng, depth - 1);
    match rng.pick(7) {
        0 => gen_rat(rng),
        1 => format!("({a}+{})", gen_rationnelle(rng, depth - 1)),
        2 => format!("({a}-{})", gen_rationnelle(rng, depth - 1)),
        3 => format!("({a}*{})", gen_rationnelle(rng, depth - 1)),
        4 => format!("({a}/{})", gen_rationnelle(rng, depth - 1)),
        5 => format!("({a})^{}", rng.pick(4)),
        _ => format!("-({a})"),
    }
}

fn gen_expr(rng: &mut Rng, depth: usize) -> String {
    if depth == 0 {
        return gen_atom(rng);
    }
    match rng.pick(6) {
        0 => gen_atom(rng),
        1 => format!("({}+{})", gen_expr(rng, depth - 1), gen_expr(rng, depth - 1)),
        2 => format!("({}-{})", gen_expr(rng, depth - 1), gen_expr(rng, depth - 1)),
        3 => format!("({}*{})", gen_expr(rng, depth - 1), gen_expr(rng, depth - 1)),
        4 => format!("({}/{})", gen_expr(rng, depth - 1), gen_expr(rng, depth - 1)),
        _ => format!("sqrt({})", gen_expr(rng, depth - 1)),
    }
}

/* ------------------------ Helper somme balancée anti pile ------------------------ */

fn somme_balancee(terme: &str, n: usize) -> String {
    let mut items: Vec<String> = (0..n).map(|_| terme.to_string()).collect();
    while items.len() > 1 {
        let mut next = Vec::new();
        let mut i = 0;
        while i < items.len() {
            if i + 1 < items.len() {
                next.push(format!("({}+{})", items[i], items[i + 1]));
                i += 2;
            } else {
                next.push(items[i].clone());
                i += 1;
            }
        }
        items = next;
    }
    items.pop().unwrap_or_else(|| "0".to_string())
}

/* ------------------------ Tests ------------------------ */

#[test]
fn fuzz_safe_exact_relu_meme_valeur() {
    let t0 = Instant::now();
    let max = Duration::from_secs(10);
    let m = moteur();

    let mut rng = Rng::new(0xC0FFEE_u64);

    let mut seen_ok = 0usize;
    let mut seen_err = 0usize;

    for _ in 0..150 {
        budget(t0, max);

        let expr = gen_rationnelle(&mut rng, 4);

        match calc(&m, &expr, Operation::Simplify) {
            Ok(exact) => {
                // rationnel => lecture exacte identique par les deux chemins
                let direct = calc(&m, &expr, Operation::Numeric)
                    .unwrap_or_else(|e| panic!("numeric({expr:?}) : {e}"));
                let relu = calc(&m, &exact, Operation::Numeric)
                    .unwrap_or_else(|e| panic!("relecture de {exact:?} ({expr:?}) : {e}"));
                assert_eq!(direct, relu, "expr={expr:?} exact={exact:?}");
                seen_ok += 1;
            }
            Err(e) => {
                assert!(is_erreur_attendue(&e), "erreur non attendue: expr={expr:?} err={e}");
                seen_err += 1;
            }
        }
    }

    // On veut voir un mix des deux, sinon le fuzz ne “balaye” rien.
    assert!(seen_ok > 10, "trop peu de succès: {seen_ok}");
    assert!(seen_err > 0, "aucune erreur vue: fuzz trop “sage”");
}

#[test]
fn fuzz_safe_irrationnels_determinisme() {
    let t0 = Instant::now();
    let max = Duration::from_secs(10);
    let m = moteur();

    let mut rng = Rng::new(0xBADC0DE_u64);

    for _ in 0..100 {
        budget(t0, max);

        let expr = gen_expr(&mut rng, 4);
        for op in [Operation::Simplify, Operation::Numeric] {
            let a = calc(&m, &expr, op);
            // même entrée => même sortie
            assert_eq!(a, calc(&m, &expr, op), "expr={expr:?}");

            match a {
                Ok(texte) if op == Operation::Simplify => {
                    // la forme EXACT doit rester lisible par le moteur
                    let relu = m.evaluate(&texte, Operation::Simplify, &Annulation::new());
                    assert!(relu.is_ok(), "relecture de {texte:?} ({expr:?}) : {relu:?}");
                }
                Ok(_) => {}
                Err(e) => {
                    assert!(is_erreur_attendue(&e), "erreur non attendue: expr={expr:?} err={e}")
                }
            }
        }
    }
}

#[test]
fn fuzz_safe_pretraitement_sans_panique() {
    let t0 = Instant::now();
    let max = Duration::from_secs(10);
    let m = moteur();

    const ALPHABET: &[&str] = &[
        "0", "1", "7", "9", "A", "F", "E", ".", " ", "+", "-", "×", "÷", "^", "(", ")", "[", "]",
        "π", "√", "x", "ans", "sqrt", "0x:", "0b:", "0x",
    ];
    let mut rng = Rng::new(0x5EED_u64);

    for _ in 0..400 {
        budget(t0, max);

        let n = rng.pick(12) as usize;
        let texte: String = (0..n)
            .map(|_| ALPHABET[rng.pick(ALPHABET.len() as u32) as usize])
            .collect();
        let base = if rng.coin() { NumeralBase::Dec } else { NumeralBase::Hex };

        let pre = ExpressionPreprocessor::new(
            Arc::new(VarsRegistry::with_defaults()),
            Arc::new(PreferencesFixes::new(base, true)),
        );

        match pre.process(&texte) {
            Ok(p) => {
                // le moteur peut refuser, jamais paniquer
                let _ = calc(&m, &p.expression, Operation::Simplify);
            }
            Err(e) => {
                let longueur = texte.chars().count();
                assert!(
                    e.span.start <= e.span.end && e.span.end <= longueur.max(1),
                    "zone hors texte: {texte:?} -> {e}"
                );
            }
        }
    }
}

#[test]
fn fuzz_safe_somme_balancee_anti_pile() {
    let t0 = Instant::now();
    let max = Duration::from_secs(5);
    let m = moteur();

    let expr = somme_balancee("1/2", 800);
    let exact = calc(&m, &expr, Operation::Simplify).unwrap_or_else(|e| panic!("err: {e}"));
    budget(t0, max);

    // 800*(1/2) = 400
    assert_eq!(exact, "400");
}
