// src/math_type.rs
//
// Classification d’un jeton à une position du texte saisi.
//
// Table de règles (une fiche par type : groupe + fonction de reconnaissance),
// parcourue dans l’ordre de priorité. La première règle qui reconnaît gagne.
//
// Pureté : le résultat ne dépend que de (texte, position, mode hex).
// Le mode hex change deux choses : A-F deviennent des chiffres, 'E' n’est plus
// une puissance de dix.

use crate::bases::NumeralBase;
use crate::erreur::ClassificationError;

/// Caractère “puissance de dix” (1.5E-3).
pub const POWER_10: char = 'E';

/// Fonctions reconnues par nom (mot entier).
pub const FONCTIONS: [&str; 2] = ["sqrt", "abs"];

/// Racine carrée unicode, gardée telle quelle (s’applique à l’atome qui suit).
pub const RACINE: char = '√';

const MARQUEURS: [&str; 5] = ["0b:", "0o:", "0d:", "0x:", "0x"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathGroupType {
    Number,
    Operation,
    Group,
    Function,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathType {
    NumeralBase,
    GroupingSeparator,
    Dot,
    Power10,
    Digit,
    BinaryOperation,
    OpenGroup,
    CloseGroup,
    Function,
    Constant,
}

impl MathType {
    pub fn group_type(self) -> MathGroupType {
        match self {
            MathType::NumeralBase
            | MathType::GroupingSeparator
            | MathType::Dot
            | MathType::Power10
            | MathType::Digit => MathGroupType::Number,
            MathType::BinaryOperation => MathGroupType::Operation,
            MathType::OpenGroup | MathType::CloseGroup => MathGroupType::Group,
            MathType::Function => MathGroupType::Function,
            MathType::Constant => MathGroupType::Other,
        }
    }
}

/// Résultat d’une classification : le texte reconnu et son type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MathTypeResult {
    pub math_type: MathType,
    pub texte: String,
    /// Position (en caractères) du premier caractère reconnu.
    pub debut: usize,
}

impl MathTypeResult {
    pub fn group_type(&self) -> MathGroupType {
        self.math_type.group_type()
    }

    pub fn len(&self) -> usize {
        self.texte.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.texte.is_empty()
    }

    /// Position juste après le jeton.
    pub fn fin(&self) -> usize {
        self.debut + self.len()
    }

    /// Forme émise dans l’expression destinée au moteur.
    pub fn normalized(&self) -> &str {
        match (self.math_type, self.texte.as_str()) {
            (MathType::NumeralBase, m) => NumeralBase::from_prefix(m).map_or(m, |b| b.prefix()),
            (MathType::BinaryOperation, "×") => "*",
            (MathType::BinaryOperation, "÷") => "/",
            (MathType::OpenGroup, _) => "(",
            (MathType::CloseGroup, _) => ")",
            (MathType::Constant, "π") => "pi",
            (_, t) => t,
        }
    }
}

/* ------------------------ Table des règles ------------------------ */

/// Une fiche par type : renvoie la longueur reconnue (en caractères) ou None.
struct Regle {
    math_type: MathType,
    reconnait: fn(&[char], usize, bool) -> Option<usize>,
}

const REGLES: [Regle; 10] = [
    Regle {
        math_type: MathType::NumeralBase,
        reconnait: regle_marqueur,
    },
    Regle {
        math_type: MathType::GroupingSeparator,
        reconnait: regle_separateur,
    },
    Regle {
        math_type: MathType::Dot,
        reconnait: regle_point,
    },
    Regle {
        math_type: MathType::Power10,
        reconnait: regle_puissance_10,
    },
    Regle {
        math_type: MathType::Digit,
        reconnait: regle_chiffre,
    },
    Regle {
        math_type: MathType::BinaryOperation,
        reconnait: regle_operation,
    },
    Regle {
        math_type: MathType::OpenGroup,
        reconnait: regle_ouvrante,
    },
    Regle {
        math_type: MathType::CloseGroup,
        reconnait: regle_fermante,
    },
    Regle {
        math_type: MathType::Function,
        reconnait: regle_fonction,
    },
    Regle {
        math_type: MathType::Constant,
        reconnait: regle_constante,
    },
];

/// Classifie le jeton qui commence à `offset`.
///
/// En cas d’échec, l’appelant doit avancer d’au moins un caractère.
pub fn classify(
    chars: &[char],
    offset: usize,
    hex_mode: bool,
) -> Result<MathTypeResult, ClassificationError> {
    if offset >= chars.len() {
        return Err(ClassificationError::NoMatch { offset });
    }

    for regle in &REGLES {
        if let Some(n) = (regle.reconnait)(chars, offset, hex_mode) {
            return Ok(MathTypeResult {
                math_type: regle.math_type,
                texte: chars[offset..offset + n].iter().collect(),
                debut: offset,
            });
        }
    }

    Err(ClassificationError::NoMatch { offset })
}

/* ------------------------ Règles ------------------------ */

/// `chars[i..]` commence-t-il par `motif` ?
pub(crate) fn commence_par(chars: &[char], i: usize, motif: &str) -> bool {
    let mut k = i;
    for m in motif.chars() {
        if chars.get(k) != Some(&m) {
            return false;
        }
        k += 1;
    }
    true
}

pub(crate) fn est_car_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn regle_marqueur(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    // en début de mot seulement : "10x" reste 10 suivi de x
    let avant = i.checked_sub(1).and_then(|k| chars.get(k));
    if avant.is_some_and(|p| est_car_ident(*p) || *p == '.') {
        return None;
    }
    let m = MARQUEURS.iter().find(|m| commence_par(chars, i, m))?;
    let n = m.chars().count();
    // forme courte "0x" : un chiffre hex doit suivre
    if !m.ends_with(':') && !chars.get(i + n).is_some_and(|c| NumeralBase::Hex.accepts(*c)) {
        return None;
    }
    Some(n)
}

fn regle_separateur(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    (chars[i].is_whitespace() || chars[i] == '\'').then_some(1)
}

fn regle_point(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    (chars[i] == '.').then_some(1)
}

fn regle_puissance_10(chars: &[char], i: usize, hex: bool) -> Option<usize> {
    if hex || chars[i] != POWER_10 {
        return None;
    }
    // 'E' n’est une puissance de dix que collé à une mantisse (sinon : identifiant)
    let avant = i.checked_sub(1).and_then(|k| chars.get(k));
    matches!(avant, Some(p) if p.is_ascii_digit() || *p == '.').then_some(1)
}

fn regle_chiffre(chars: &[char], i: usize, hex: bool) -> Option<usize> {
    let c = chars[i];
    (c.is_ascii_digit() || (hex && NumeralBase::Hex.accepts(c))).then_some(1)
}

fn regle_operation(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    matches!(chars[i], '+' | '-' | '*' | '/' | '^' | '×' | '÷').then_some(1)
}

fn regle_ouvrante(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    matches!(chars[i], '(' | '[').then_some(1)
}

fn regle_fermante(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    matches!(chars[i], ')' | ']').then_some(1)
}

fn regle_fonction(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    if chars[i] == RACINE {
        return Some(1);
    }
    FONCTIONS.iter().find_map(|nom| {
        let n = nom.len();
        let mot_entier = !chars.get(i + n).is_some_and(|c| est_car_ident(*c));
        (commence_par(chars, i, nom) && mot_entier).then_some(n)
    })
}

fn regle_constante(chars: &[char], i: usize, _hex: bool) -> Option<usize> {
    let c = chars[i];
    if c == 'π' {
        return Some(1);
    }
    if !(c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    let mut k = i + 1;
    while k < chars.len() && est_car_ident(chars[k]) {
        k += 1;
    }
    Some(k - i)
}
