// src/evenements.rs
//
// Événements du cycle de vie d’un calcul, d’une conversion et des collaborateurs.
//
// EventData : identité d’une unité de travail (event_id unique, sequence_id
// partagé par une chaîne : évaluation + reprise éventuelle).

use std::fmt;
use std::ops::Range;

use crate::bases::NumeralBase;
use crate::collaborateurs::{DisplayState, EditorState};
use crate::erreur::{ConversionError, EngineError, ParseError};
use crate::moteur::{Message, Operation};
use crate::variables::Variable;

/// Aucun identifiant n’a cette valeur : le premier distribué est FIRST_ID + 1.
pub const FIRST_ID: u64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventData {
    pub event_id: u64,
    pub sequence_id: u64,
}

impl EventData {
    /// L’événement ouvre-t-il sa propre chaîne ?
    pub fn is_own_sequence(&self) -> bool {
        self.event_id == self.sequence_id
    }
}

impl fmt::Display for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/seq {}", self.event_id, self.sequence_id)
    }
}

/* ------------------------ Charges utiles ------------------------ */

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalculatorOutput {
    pub operation: Operation,
    /// Expression normalisée effectivement évaluée.
    pub expression: String,
    pub texte: String,
}

impl CalculatorOutput {
    pub fn empty(operation: Operation) -> Self {
        Self {
            operation,
            expression: String::new(),
            texte: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.texte.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NatureEchec {
    Parse,
    Arithmetic,
    TooComplex,
    NumeralBase,
    UndefinedVariable,
    Engine,
}

/// Échec terminal, avec de quoi afficher un message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Echec {
    pub operation: Operation,
    pub expression: String,
    pub nature: NatureEchec,
    pub message: String,
    /// Zone fautive : texte saisi (prétraitement) ou expression normalisée (moteur).
    pub span: Option<Range<usize>>,
}

impl Echec {
    pub fn depuis_parse(operation: Operation, saisie: &str, e: &ParseError) -> Self {
        Self {
            operation,
            expression: saisie.to_string(),
            nature: NatureEchec::Parse,
            message: e.message.clone(),
            span: Some(e.span.clone()),
        }
    }

    pub fn depuis_moteur(operation: Operation, expression: &str, e: &EngineError) -> Self {
        let (nature, span) = match e {
            EngineError::Parse { position, .. } => (NatureEchec::Parse, position.map(|p| p..p + 1)),
            EngineError::Arithmetic(_) => (NatureEchec::Arithmetic, None),
            EngineError::StackOverflow => (NatureEchec::TooComplex, None),
            EngineError::NumeralBaseMismatch { .. } => (NatureEchec::NumeralBase, None),
            EngineError::UndefinedVariable(_) => (NatureEchec::UndefinedVariable, None),
            EngineError::Interrupted | EngineError::Internal(_) => (NatureEchec::Engine, None),
        };
        Self {
            operation,
            expression: expression.to_string(),
            nature,
            message: e.to_string(),
            span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversion {
    pub value: String,
    pub from: NumeralBase,
    pub to: NumeralBase,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

/* ------------------------ Événement ------------------------ */

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evenement {
    CalculationResult(CalculatorOutput),
    CalculationFailed(Echec),
    CalculationCancelled,
    CalculationMessages(Vec<Message>),

    ConversionStarted(Conversion),
    ConversionResult { conversion: Conversion, texte: String },
    ConversionFailed { conversion: Conversion, erreur: ConversionError },

    DisplayStateChanged(Change<DisplayState>),
    EditorStateChanged(Change<EditorState>),

    ConstantAdded(Variable),
    ConstantChanged(Change<Variable>),
    ConstantRemoved(Variable),

    FunctionAdded(String),
    FunctionChanged(String),
    FunctionRemoved(String),

    EnginePreferencesChanged,
    ManualCalculationRequested(EditorState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeEvenement {
    CalculationResult,
    CalculationFailed,
    CalculationCancelled,
    CalculationMessages,
    ConversionStarted,
    ConversionResult,
    ConversionFailed,
    DisplayStateChanged,
    EditorStateChanged,
    ConstantAdded,
    ConstantChanged,
    ConstantRemoved,
    FunctionAdded,
    FunctionChanged,
    FunctionRemoved,
    EnginePreferencesChanged,
    ManualCalculationRequested,
}

impl Evenement {
    pub fn type_evenement(&self) -> TypeEvenement {
        use Evenement as E;
        use TypeEvenement as T;
        match self {
            E::CalculationResult(_) => T::CalculationResult,
            E::CalculationFailed(_) => T::CalculationFailed,
            E::CalculationCancelled => T::CalculationCancelled,
            E::CalculationMessages(_) => T::CalculationMessages,
            E::ConversionStarted(_) => T::ConversionStarted,
            E::ConversionResult { .. } => T::ConversionResult,
            E::ConversionFailed { .. } => T::ConversionFailed,
            E::DisplayStateChanged(_) => T::DisplayStateChanged,
            E::EditorStateChanged(_) => T::EditorStateChanged,
            E::ConstantAdded(_) => T::ConstantAdded,
            E::ConstantChanged(_) => T::ConstantChanged,
            E::ConstantRemoved(_) => T::ConstantRemoved,
            E::FunctionAdded(_) => T::FunctionAdded,
            E::FunctionChanged(_) => T::FunctionChanged,
            E::FunctionRemoved(_) => T::FunctionRemoved,
            E::EnginePreferencesChanged => T::EnginePreferencesChanged,
            E::ManualCalculationRequested(_) => T::ManualCalculationRequested,
        }
    }
}

/// Observateur, appelé sur le thread séquenceur.
pub trait Ecouteur: Send + Sync {
    fn on_event(&self, data: &EventData, evenement: &Evenement);
}
