//! Noyau exact Q-pur : moteur mathématique intégré
//!
//! Organisation interne :
//! - jetons.rs   : tokenisation de l’expression normalisée
//! - rpn.rs      : shunting-yard + construction Expr (profondeur bornée)
//! - expr.rs     : AST exact + simplify
//! - format.rs   : affichage EXACT “joli” (√2/2, 3*π/2…), relisible
//! - lecture.rs  : lecture décimale tronquée + cache π
//! - eval.rs     : MoteurExact (MathEngine) + résultat paresseux

pub mod eval;
pub mod expr;
pub mod format;
pub mod jetons;
pub mod lecture;
pub mod rpn;

#[cfg(test)]
mod tests_fuzz_safe;

// API publique minimale
pub use eval::MoteurExact;
