//! Calculatrice flux : pipeline d’évaluation d’expressions
//!
//! Texte saisi -> prétraitement (classification + littéraux) -> moteur
//! mathématique sur un pool -> événements livrés dans l’ordre par le bus.
//!
//! Organisation :
//! - bases.rs          : bases numériques + conversion entière
//! - math_type.rs      : classification des jetons
//! - nombre.rs         : NumberBuilder (continuation des littéraux)
//! - pretraitement.rs  : ExpressionPreprocessor
//! - calculatrice.rs   : EvaluationEngine (asynchrone, reprises, réactions)
//! - bus.rs            : EventBus (séquenceur unique)
//! - noyau/            : moteur exact intégré (rationnels, π, √)

pub mod bases;
pub mod bus;
pub mod calculatrice;
pub mod collaborateurs;
pub mod config;
pub mod erreur;
pub mod evenements;
pub mod journal;
pub mod math_type;
pub mod moteur;
pub mod nombre;
pub mod noyau;
pub mod pool;
pub mod pretraitement;
pub mod variables;

#[cfg(test)]
mod tests_pipeline;

pub use bases::NumeralBase;
pub use bus::EventBus;
pub use calculatrice::{Contexte, EvaluationEngine};
pub use config::Configuration;
pub use erreur::{ClassificationError, ConversionError, EngineError, ParseError};
pub use evenements::{Ecouteur, EventData, Evenement};
pub use moteur::{MathEngine, Operation};
pub use pretraitement::{ExpressionPreprocessor, PreparedExpression};
