// src/pretraitement.rs
//
// Texte saisi -> expression normalisée pour le moteur.
//
// Balayage gauche -> droite : classification, puis NumberBuilder pour les
// littéraux. Aucune donnée ne survit entre deux appels.
//
// Règles d’émission :
// - littéral : marqueur canonique (explicite ou base de session != déc) + chiffres
// - chiffre refusé par la base : émis brut, collé (le moteur signalera la base)
// - multiplication implicite entre une fin d’opérande et un début d’opérande
// - espaces hors littéral : supprimés (sauf après un nom de fonction)

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::bases::NumeralBase;
use crate::collaborateurs::Preferences;
use crate::erreur::{ClassificationError, ParseError};
use crate::math_type::{classify, est_car_ident, MathType, MathTypeResult};
use crate::nombre::{Litteral, NumberBuilder};
use crate::variables::{VarsRegistry, PI};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedExpression {
    pub expression: String,
    /// Identifiants absents du registre, dans l’ordre d’apparition, sans doublon.
    pub undefined_vars: Vec<String>,
}

impl PreparedExpression {
    pub fn exists_undefined_var(&self) -> bool {
        !self.undefined_vars.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }
}

impl fmt::Display for PreparedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

pub struct ExpressionPreprocessor {
    variables: Arc<VarsRegistry>,
    preferences: Arc<dyn Preferences>,
}

impl ExpressionPreprocessor {
    pub fn new(variables: Arc<VarsRegistry>, preferences: Arc<dyn Preferences>) -> Self {
        Self {
            variables,
            preferences,
        }
    }

    /// Base de session = base courante des préférences.
    pub fn process(&self, texte: &str) -> Result<PreparedExpression, ParseError> {
        self.process_with_base(texte, self.preferences.numeral_base())
    }

    pub fn process_with_base(
        &self,
        texte: &str,
        base: NumeralBase,
    ) -> Result<PreparedExpression, ParseError> {
        let chars: Vec<char> = texte.chars().collect();
        let mut nb = NumberBuilder::new(base);
        let mut sortie = Sortie::new(&self.variables, base);

        let mut i = 0;
        let mut debut_litteral = 0;

        while i < chars.len() {
            let r = classify(&chars, i, nb.is_hex_mode()).map_err(|e| match e {
                ClassificationError::NoMatch { offset } => ParseError::new(
                    format!("caractère inattendu: '{}'", chars[offset]),
                    offset..offset + 1,
                ),
            })?;

            // suite de chiffres refusés : reste brute jusqu’au prochain jeton étranger
            if sortie.dernier == Dernier::Brut
                && matches!(r.math_type, MathType::Digit | MathType::Dot | MathType::Power10)
            {
                sortie.brut(&r);
                i = r.fin();
                continue;
            }

            let ouvert_avant = nb.is_open();
            let t = nb.process(&r);
            let nouveau = t.absorbe && (!ouvert_avant || t.ferme.is_some());

            if let Some(lit) = t.ferme {
                if lit.chiffres().is_empty() && r.math_type == MathType::Digit && !t.absorbe {
                    // marqueur suivi d’un chiffre refusé : le tout reste brut ("0b:2")
                    sortie.marqueur_brut(&lit, debut_litteral..r.debut);
                } else {
                    sortie.litteral(&lit, debut_litteral..r.debut)?;
                }
            }
            if nouveau {
                debut_litteral = r.debut;
            }
            if !t.absorbe {
                sortie.jeton(&r)?;
            }

            i = r.fin();
        }

        if let Some(lit) = nb.finish() {
            sortie.litteral(&lit, debut_litteral..chars.len())?;
        }

        let prepared = sortie.terminer()?;
        trace!(saisie = texte, expression = %prepared, base = %base, "prétraitement");
        Ok(prepared)
    }
}

/* ------------------------ Émission ------------------------ */

/// Dernier élément émis (pilote multiplication implicite et validation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dernier {
    Rien,
    Litteral,
    Brut,
    Constante,
    Fermante,
    Operateur,
    Ouvrante,
    Fonction,
}

impl Dernier {
    fn fin_operande(self) -> bool {
        matches!(
            self,
            Dernier::Litteral | Dernier::Brut | Dernier::Constante | Dernier::Fermante
        )
    }

    fn attend_operande(self) -> bool {
        matches!(
            self,
            Dernier::Rien | Dernier::Operateur | Dernier::Ouvrante | Dernier::Fonction
        )
    }
}

struct Sortie<'a> {
    variables: &'a VarsRegistry,
    base: NumeralBase,
    texte: String,
    dernier: Dernier,
    /// Zone (texte saisi) du dernier élément émis.
    zone: std::ops::Range<usize>,
    ouvertes: Vec<usize>,
    indefinies: Vec<String>,
}

impl<'a> Sortie<'a> {
    fn new(variables: &'a VarsRegistry, base: NumeralBase) -> Self {
        Self {
            variables,
            base,
            texte: String::new(),
            dernier: Dernier::Rien,
            zone: 0..0,
            ouvertes: Vec::new(),
            indefinies: Vec::new(),
        }
    }

    /// Émet un début d’opérande, avec '*' implicite ou espace après un nom de fonction.
    fn operande(&mut self, s: &str) {
        if self.dernier.fin_operande() {
            self.texte.push('*');
        } else if self.dernier == Dernier::Fonction
            && self.texte.chars().last().is_some_and(est_car_ident)
            && s.chars().next().is_some_and(est_car_ident)
        {
            self.texte.push(' ');
        }
        self.texte.push_str(s);
    }

    fn litteral(&mut self, lit: &Litteral, zone: std::ops::Range<usize>) -> Result<(), ParseError> {
        if lit.chiffres().is_empty() {
            return Err(ParseError::new("marqueur de base sans chiffres", zone));
        }
        self.operande(&lit.normalise());
        self.dernier = Dernier::Litteral;
        self.zone = zone;
        Ok(())
    }

    /// Chiffres refusés par la base. Collés au littéral qui précède ; sinon
    /// précédés du marqueur de session, pour que le moteur signale la base
    /// au lieu de lire le nombre en décimal.
    fn brut(&mut self, r: &MathTypeResult) {
        let colle = matches!(self.dernier, Dernier::Litteral | Dernier::Brut);
        let texte = if colle || self.base == NumeralBase::Dec {
            r.texte.clone()
        } else {
            format!("{}{}", self.base.prefix(), r.texte)
        };
        match self.dernier {
            Dernier::Litteral | Dernier::Brut | Dernier::Rien | Dernier::Operateur | Dernier::Ouvrante => {
                self.texte.push_str(&texte)
            }
            _ => self.operande(&texte),
        }
        self.dernier = Dernier::Brut;
        self.zone = r.debut..r.fin();
    }

    /// Marqueur explicite sans chiffre acceptable : émis tel quel, la suite
    /// brute s’y colle.
    fn marqueur_brut(&mut self, lit: &Litteral, zone: std::ops::Range<usize>) {
        self.operande(lit.base.prefix());
        self.dernier = Dernier::Brut;
        self.zone = zone;
    }

    fn jeton(&mut self, r: &MathTypeResult) -> Result<(), ParseError> {
        let zone = r.debut..r.fin();
        match r.math_type {
            // séparateur hors littéral
            MathType::GroupingSeparator => return Ok(()),

            MathType::Digit | MathType::Dot | MathType::Power10 | MathType::NumeralBase => {
                self.brut(r);
                return Ok(());
            }

            MathType::BinaryOperation => {
                let op = r.normalized();
                if matches!(op, "*" | "/" | "^") && self.dernier.attend_operande() {
                    return Err(ParseError::new(format!("opérateur '{}' mal placé", r.texte), zone));
                }
                self.texte.push_str(op);
                self.dernier = Dernier::Operateur;
            }

            MathType::OpenGroup => {
                self.operande("(");
                self.ouvertes.push(r.debut);
                self.dernier = Dernier::Ouvrante;
            }

            MathType::CloseGroup => {
                if self.ouvertes.pop().is_none() {
                    return Err(ParseError::new("parenthèse fermante sans ouvrante", zone));
                }
                match self.dernier {
                    Dernier::Ouvrante => return Err(ParseError::new("groupe vide", zone)),
                    Dernier::Operateur | Dernier::Fonction => {
                        return Err(ParseError::new("expression incomplète", zone))
                    }
                    _ => {}
                }
                self.texte.push(')');
                self.dernier = Dernier::Fermante;
            }

            MathType::Function => {
                self.operande(&r.texte);
                self.dernier = Dernier::Fonction;
            }

            MathType::Constant => {
                let nom = r.normalized().to_string();
                if nom != PI && !self.variables.contains(&nom) && !self.indefinies.contains(&nom) {
                    self.indefinies.push(nom.clone());
                }
                self.operande(&nom);
                self.dernier = Dernier::Constante;
            }
        }
        self.zone = zone;
        Ok(())
    }

    fn terminer(self) -> Result<PreparedExpression, ParseError> {
        if matches!(self.dernier, Dernier::Operateur | Dernier::Fonction) {
            return Err(ParseError::new("expression incomplète", self.zone));
        }
        if let Some(&pos) = self.ouvertes.last() {
            return Err(ParseError::new("parenthèse non fermée", pos..pos + 1));
        }
        Ok(PreparedExpression {
            expression: self.texte,
            undefined_vars: self.indefinies,
        })
    }
}
