// src/noyau/jetons.rs
//
// Tokenisation de l’expression normalisée (sortie du prétraitement).
// - nombres : décimal par défaut, ou précédés d’un marqueur "0b:" "0o:" "0d:" "0x:"
// - chiffre hors base après un marqueur => NumeralBaseMismatch
// - 'E' (hors hex) : puissance de dix, signe optionnel
// - identifiants sensibles à la casse ; "pi" et "π" => Pi ; "√" => sqrt

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::bases::NumeralBase;
use crate::erreur::EngineError;
use crate::math_type::{commence_par, est_car_ident, POWER_10};

/// Exposant décimal maximal accepté dans un littéral (1E10000).
const EXPOSANT_MAX: u32 = 10_000;

#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
    Num(BigRational),
    Pi,

    // Fonctions + variables : le passage RPN -> Expr tranche.
    Ident(String),

    Plus,
    Minus,
    /// Moins unaire (posé par to_rpn, jamais par tokenize).
    Neg,
    Star,
    Slash,
    Caret,

    LPar,
    RPar,
}

pub fn tokenize(s: &str) -> Result<Vec<Tok>, EngineError> {
    let mut out = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i: usize = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let simple = match c {
            '(' => Some(Tok::LPar),
            ')' => Some(Tok::RPar),
            '+' => Some(Tok::Plus),
            '-' => Some(Tok::Minus),
            '*' => Some(Tok::Star),
            '/' => Some(Tok::Slash),
            '^' => Some(Tok::Caret),
            'π' => Some(Tok::Pi),
            '√' => Some(Tok::Ident("sqrt".to_string())),
            _ => None,
        };
        if let Some(t) = simple {
            out.push(t);
            i += 1;
            continue;
        }

        // Nombre avec marqueur de base
        if let Some(base) = NumeralBase::TOUTES
            .into_iter()
            .find(|b| commence_par(&chars, i, b.prefix()))
        {
            i += base.prefix().len();
            let (r, suite) = lire_nombre(&chars, i, base)?;
            out.push(Tok::Num(r));
            i = suite;
            continue;
        }

        // Nombre décimal
        if c.is_ascii_digit() || c == '.' {
            let (r, suite) = lire_nombre(&chars, i, NumeralBase::Dec)?;
            out.push(Tok::Num(r));
            i = suite;
            continue;
        }

        // Identifiants ASCII : [a-zA-Z_][a-zA-Z0-9_]*
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && est_car_ident(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word == "pi" {
                out.push(Tok::Pi);
            } else {
                out.push(Tok::Ident(word));
            }
            continue;
        }

        return Err(EngineError::parse(format!("caractère inattendu: '{c}'"), Some(i)));
    }

    Ok(out)
}

/// Lit mantisse (chiffres + '.' éventuel) puis exposant 'E' en décimal.
/// Renvoie la valeur exacte et l’indice du premier caractère non lu.
fn lire_nombre(
    chars: &[char],
    debut: usize,
    base: NumeralBase,
) -> Result<(BigRational, usize), EngineError> {
    let radix = BigInt::from(base.radix());
    let mut i = debut;
    let mut entier = BigInt::zero();
    let mut decimales: u32 = 0;
    let mut point = false;
    let mut chiffres = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c == '.' {
            if point {
                return Err(EngineError::parse("deux points dans un nombre", Some(i)));
            }
            point = true;
            i += 1;
            continue;
        }
        let candidat = c.is_ascii_digit() || (base == NumeralBase::Hex && NumeralBase::Hex.accepts(c));
        if !candidat {
            break;
        }
        if !base.accepts(c) {
            return Err(EngineError::NumeralBaseMismatch { digit: c, base });
        }
        let v = c.to_digit(16).unwrap_or(0);
        entier = entier * &radix + BigInt::from(v);
        if point {
            decimales += 1;
        }
        chiffres += 1;
        i += 1;
    }

    if chiffres == 0 {
        return Err(EngineError::parse("nombre invalide", Some(debut)));
    }

    let mut r = BigRational::new(entier, radix.pow(decimales));

    // Puissance de dix
    if base != NumeralBase::Hex && chars.get(i) == Some(&POWER_10) {
        let pos_e = i;
        i += 1;
        let negatif = match chars.get(i) {
            Some('-') => {
                i += 1;
                true
            }
            Some('+') => {
                i += 1;
                false
            }
            _ => false,
        };
        let d = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if d == i {
            return Err(EngineError::parse("exposant incomplet", Some(pos_e)));
        }
        let texte: String = chars[d..i].iter().collect();
        let n: u32 = texte
            .parse()
            .ok()
            .filter(|n| *n <= EXPOSANT_MAX)
            .ok_or(EngineError::StackOverflow)?;
        let p = BigRational::from_integer(BigInt::from(10).pow(n));
        r = if negatif { r / p } else { r * p };
    }

    Ok((r, i))
}

/// Liste de jetons en texte (journal de trace).
pub fn format_tokens(tokens: &[Tok]) -> String {
    fn format_rat(r: &BigRational) -> String {
        let n = r.numer();
        let d = r.denom();
        if d.is_one() {
            format!("{n}")
        } else {
            format!("{n}/{d}")
        }
    }

    let mut out = Vec::new();
    for t in tokens {
        let s = match t {
            Tok::Num(r) => format_rat(r),
            Tok::Pi => "π".to_string(),
            Tok::Ident(name) => name.clone(),

            Tok::Plus => "+".to_string(),
            Tok::Minus => "-".to_string(),
            Tok::Neg => "neg".to_string(),
            Tok::Star => "*".to_string(),
            Tok::Slash => "/".to_string(),
            Tok::Caret => "^".to_string(),

            Tok::LPar => "(".to_string(),
            Tok::RPar => ")".to_string(),
        };
        out.push(s);
    }
    out.join(" ")
}
