// src/erreur.rs
//
// Erreurs typées du pipeline.
// - ClassificationError : aucune règle MathType à une position
// - ParseError          : prétraitement impossible (position en caractères du texte brut)
// - EngineError         : échecs levés par le moteur mathématique
// - ConversionError     : conversion de base impossible
// - CollaboratorError   : échec d’un collaborateur externe (préférences…)

use std::ops::Range;

use thiserror::Error;

use crate::bases::NumeralBase;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("aucun type reconnu à la position {offset}")]
    NoMatch { offset: usize },
}

/// Texte impossible à transformer en expression bien formée.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message} (position {}..{})", span.start, span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Position relative à l’expression normalisée, pas au texte saisi.
    #[error("{message}")]
    Parse {
        message: String,
        position: Option<usize>,
    },

    #[error("{0}")]
    Arithmetic(String),

    #[error("expression trop complexe")]
    StackOverflow,

    #[error("chiffre '{digit}' invalide en base {base}")]
    NumeralBaseMismatch { digit: char, base: NumeralBase },

    #[error("variable non définie : {0}")]
    UndefinedVariable(String),

    /// Interruption coopérative : ce n’est pas un échec.
    #[error("évaluation interrompue")]
    Interrupted,

    #[error("erreur interne du moteur : {0}")]
    Internal(String),
}

impl EngineError {
    pub fn parse(message: impl Into<String>, position: Option<usize>) -> Self {
        EngineError::Parse {
            message: message.into(),
            position,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("rien à convertir")]
    Empty,

    #[error("conversion impossible : '{0}' n’est pas un entier")]
    NotAnInteger(String),

    #[error("chiffre '{digit}' invalide en base {base}")]
    InvalidDigit { digit: char, base: NumeralBase },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("collaborateur : {0}")]
pub struct CollaboratorError(pub String);
