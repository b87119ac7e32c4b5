//! Noyau — évaluation (moteur exact intégré)
//!
//! tokenize -> RPN -> Expr -> substitution des constantes du registre
//!        -> (paresseux) simplify -> EXACT (format) ou lecture décimale
//!
//! Le résultat est paresseux : `render()` fait le vrai travail et peut encore
//! échouer (division par zéro, variable non définie…).

use std::cell::RefCell;
use std::sync::Arc;

use num_bigint::BigInt;
use tracing::trace;

use super::expr::Expr;
use super::format::format_expr;
use super::jetons::{format_tokens, tokenize};
use super::lecture::{decimal_exact, eval_scaled, scaled_to_decimal, trim_decimal, GARDE};
use super::rpn::{from_rpn, to_rpn};
use crate::config::Configuration;
use crate::erreur::EngineError;
use crate::moteur::{Annulation, Generic, MathEngine, Message, Operation};
use crate::variables::VarsRegistry;

thread_local! {
    // Messages de la dernière évaluation exécutée sur ce thread.
    static MESSAGES: RefCell<Vec<Message>> = const { RefCell::new(Vec::new()) };
}

fn pousser_message(m: Message) {
    MESSAGES.with(|ms| {
        let mut ms = ms.borrow_mut();
        if !ms.contains(&m) {
            ms.push(m);
        }
    });
}

/// Moteur exact : rationnels, π, √, abs, puissances entières.
pub struct MoteurExact {
    variables: Arc<VarsRegistry>,
    chiffres: usize,
    profondeur_max: usize,
}

impl MoteurExact {
    pub fn new(variables: Arc<VarsRegistry>, config: &Configuration) -> Self {
        Self {
            variables,
            chiffres: config.chiffres,
            profondeur_max: config.profondeur_max,
        }
    }

    fn analyser(&self, texte: &str) -> Result<Expr, EngineError> {
        let jetons = tokenize(texte)?;
        let rpn = to_rpn(&jetons)?;
        trace!(jetons = %format_tokens(&jetons), rpn = %format_tokens(&rpn), "analyse");
        from_rpn(&rpn, self.profondeur_max)
    }

    /// Remplace les constantes définies par leur valeur (récursivement).
    /// `en_cours` : pile des noms en cours de substitution (cycles).
    fn substituer(&self, e: Expr, en_cours: &mut Vec<String>) -> Result<Expr, EngineError> {
        e.remplacer_vars(&mut |nom: &str| {
            let Some(var) = self.variables.get(nom) else {
                return Ok(None);
            };
            if var.value.trim().is_empty() {
                pousser_message(Message::warning(format!("{nom} n’a pas de valeur : gardée symbolique")));
                return Ok(None);
            }
            if en_cours.iter().any(|n| n == nom) {
                return Err(EngineError::Arithmetic(format!("définition circulaire : {nom}")));
            }
            let valeur = self.analyser(&var.value).map_err(|e| match e {
                EngineError::Parse { message, .. } => {
                    EngineError::parse(format!("valeur de {nom} invalide : {message}"), None)
                }
                autre => autre,
            })?;
            en_cours.push(nom.to_string());
            let r = self.substituer(valeur, en_cours);
            en_cours.pop();
            r.map(Some)
        })
    }
}

impl MathEngine for MoteurExact {
    fn evaluate(
        &self,
        expression: &str,
        operation: Operation,
        annulation: &Annulation,
    ) -> Result<Box<dyn Generic>, EngineError> {
        MESSAGES.with(|ms| ms.borrow_mut().clear());
        annulation.verifier()?;

        let s = expression.trim();
        if s.is_empty() {
            return Err(EngineError::parse("expression vide", Some(0)));
        }

        let expr = self.analyser(s)?;
        let expr = self.substituer(expr, &mut Vec::new())?;
        if expr.profondeur() > self.profondeur_max {
            return Err(EngineError::StackOverflow);
        }
        annulation.verifier()?;

        trace!(%operation, expr = %expr, "évaluation");
        Ok(Box::new(ResultatExact {
            expr,
            operation,
            chiffres: self.chiffres,
            annulation: annulation.clone(),
        }))
    }

    fn drain_messages(&self) -> Result<Vec<Message>, EngineError> {
        Ok(MESSAGES.with(|ms| std::mem::take(&mut *ms.borrow_mut())))
    }
}

/// Résultat paresseux du moteur exact.
#[derive(Debug)]
pub struct ResultatExact {
    expr: Expr,
    operation: Operation,
    chiffres: usize,
    annulation: Annulation,
}

impl ResultatExact {
    fn numerique(&self, e: Expr) -> Result<String, EngineError> {
        if let Some(nom) = e.premiere_var() {
            return Err(EngineError::UndefinedVariable(nom.to_string()));
        }

        if let Expr::Rat(r) = &e {
            let (texte, exact) = decimal_exact(r, self.chiffres);
            if !exact {
                pousser_message(message_troncature(self.chiffres));
            }
            return Ok(texte);
        }

        // lecture avec chiffres de garde, puis troncature
        let scaled = eval_scaled(&e, self.chiffres + GARDE, &self.annulation)?;
        let scaled = scaled / BigInt::from(10).pow(GARDE as u32);
        pousser_message(message_troncature(self.chiffres));
        Ok(trim_decimal(&scaled_to_decimal(scaled, self.chiffres)))
    }
}

fn message_troncature(chiffres: usize) -> Message {
    Message::info(format!("résultat tronqué à {chiffres} décimales"))
}

impl Generic for ResultatExact {
    fn render(&self) -> Result<String, EngineError> {
        self.annulation.verifier()?;

        // à tester AVANT simplify (0*(1/0) deviendrait 0)
        if self.expr.division_par_zero() {
            return Err(EngineError::Arithmetic("division par zéro".into()));
        }

        let e = self.expr.clone().simplify();
        self.annulation.verifier()?;

        match self.operation {
            Operation::Numeric => self.numerique(e),
            Operation::Simplify => Ok(format_expr(&e)),
        }
    }
}
