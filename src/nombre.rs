// src/nombre.rs
//
// Reconstruction des littéraux numériques, jeton par jeton.
//
// Une session = un passage du prétraitement. Elle garde :
// - la base de session (préférences, ou imposée par l’appelant)
// - la base active du littéral ouvert (un marqueur "0x:" la change)
// - l’accumulateur (None = aucun littéral ouvert)
//
// La décision ne dépend que de l’état courant et du jeton reçu,
// jamais de la position dans le texte.

use crate::bases::NumeralBase;
use crate::math_type::{MathGroupType, MathType, MathTypeResult, POWER_10};

/// Littéral fermé, prêt à être émis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Litteral {
    pub base: NumeralBase,
    /// Marqueur présent dans le texte saisi.
    pub explicite: bool,
    /// Texte brut accumulé (séparateurs compris, marqueur exclu).
    pub corps: String,
}

impl Litteral {
    /// Corps sans séparateurs de groupes.
    pub fn chiffres(&self) -> String {
        self.corps
            .chars()
            .filter(|c| !(c.is_whitespace() || *c == '\''))
            .collect()
    }

    /// Forme émise : marqueur canonique si explicite ou hors décimal, puis les chiffres.
    pub fn normalise(&self) -> String {
        let chiffres = self.chiffres();
        if self.explicite || self.base != NumeralBase::Dec {
            format!("{}{chiffres}", self.base.prefix())
        } else {
            chiffres
        }
    }
}

/// Issue de `NumberBuilder::process`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Traitement {
    /// Littéral fermé par ce jeton, s’il y en avait un d’ouvert.
    pub ferme: Option<Litteral>,
    /// Le jeton fait partie d’un littéral (continué ou nouvellement ouvert).
    pub absorbe: bool,
}

#[derive(Clone, Debug)]
pub struct NumberBuilder {
    base_session: NumeralBase,
    nb: NumeralBase,
    courant: Option<String>,
    explicite: bool,
}

impl NumberBuilder {
    pub fn new(base: NumeralBase) -> Self {
        Self {
            base_session: base,
            nb: base,
            courant: None,
            explicite: false,
        }
    }

    /// Base de session imposée (re-normalisation dans une base donnée).
    pub fn with_base(self, base: NumeralBase) -> Self {
        Self::new(base)
    }

    pub fn numeral_base(&self) -> NumeralBase {
        self.nb
    }

    /// Mode hex : décide de la classification (A-F chiffres, pas de 'E' exposant).
    pub fn is_hex_mode(&self) -> bool {
        self.nb == NumeralBase::Hex
    }

    pub fn is_open(&self) -> bool {
        self.courant.is_some()
    }

    /// Le jeton prolonge-t-il le littéral ouvert (ou en ouvre-t-il un) ?
    pub fn can_continue(&self, r: &MathTypeResult) -> bool {
        let ouvert = self.courant.is_some();

        // séparateur hors littéral : frontière, jamais le début d’un nombre
        let space_before = !ouvert && r.math_type == MathType::GroupingSeparator;

        // seul un chiffre est contrôlé ('.', 'E', séparateurs passent)
        let numeral_base_check = r.math_type != MathType::Digit
            || r.texte.chars().next().is_some_and(|c| self.nb.accepts(c));

        let numeral_base_in_the_start = r.math_type != MathType::NumeralBase || !ouvert;

        let sign_after_e = !self.is_hex_mode()
            && (r.texte == "+" || r.texte == "-")
            && self
                .courant
                .as_deref()
                .is_some_and(|c| c.ends_with(POWER_10));

        (r.group_type() == MathGroupType::Number
            && !space_before
            && numeral_base_check
            && numeral_base_in_the_start)
            || sign_after_e
    }

    /// Intègre le jeton : le littéral continue, ou bien il est fermé et le jeton
    /// ouvre éventuellement le suivant.
    pub fn process(&mut self, r: &MathTypeResult) -> Traitement {
        if self.can_continue(r) {
            self.absorber(r);
            return Traitement {
                ferme: None,
                absorbe: true,
            };
        }

        let ferme = self.finish();
        let absorbe = self.can_continue(r);
        if absorbe {
            self.absorber(r);
        }
        Traitement { ferme, absorbe }
    }

    /// Ferme le littéral ouvert (fin de texte ou jeton étranger).
    pub fn finish(&mut self) -> Option<Litteral> {
        let corps = self.courant.take()?;
        let lit = Litteral {
            base: self.nb,
            explicite: self.explicite,
            corps,
        };
        self.nb = self.base_session;
        self.explicite = false;
        Some(lit)
    }

    fn absorber(&mut self, r: &MathTypeResult) {
        if r.math_type == MathType::NumeralBase {
            // le marqueur change la base active mais n’est pas accumulé
            if let Some(base) = NumeralBase::from_prefix(&r.texte) {
                self.nb = base;
            }
            self.explicite = true;
            self.courant = Some(String::new());
            return;
        }
        self.courant
            .get_or_insert_with(String::new)
            .push_str(&r.texte);
    }
}
