// src/bases.rs
//
// Bases de numération supportées (bin / oct / déc / hex).
// - chiffres acceptables par base (hex : majuscules seulement)
// - marqueurs canoniques "0b:", "0o:", "0d:", "0x:" (forme émise par le prétraitement)
// - conversion d’un entier d’une base vers une autre (big int, sans flottants)

use std::fmt;

use num_bigint::BigInt;
use num_traits::Signed;

use crate::erreur::ConversionError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NumeralBase {
    Bin,
    Oct,
    #[default]
    Dec,
    Hex,
}

impl NumeralBase {
    pub const TOUTES: [NumeralBase; 4] = [
        NumeralBase::Bin,
        NumeralBase::Oct,
        NumeralBase::Dec,
        NumeralBase::Hex,
    ];

    pub fn radix(self) -> u32 {
        match self {
            NumeralBase::Bin => 2,
            NumeralBase::Oct => 8,
            NumeralBase::Dec => 10,
            NumeralBase::Hex => 16,
        }
    }

    pub fn acceptable_characters(self) -> &'static str {
        match self {
            NumeralBase::Bin => "01",
            NumeralBase::Oct => "01234567",
            NumeralBase::Dec => "0123456789",
            NumeralBase::Hex => "0123456789ABCDEF",
        }
    }

    pub fn accepts(self, c: char) -> bool {
        self.acceptable_characters().contains(c)
    }

    /// Marqueur canonique, placé devant un littéral.
    pub fn prefix(self) -> &'static str {
        match self {
            NumeralBase::Bin => "0b:",
            NumeralBase::Oct => "0o:",
            NumeralBase::Dec => "0d:",
            NumeralBase::Hex => "0x:",
        }
    }

    /// Base désignée par un marqueur. "0x" (sans ':') reste accepté : 'x' n’est un chiffre nulle part.
    pub fn from_prefix(marqueur: &str) -> Option<NumeralBase> {
        match marqueur {
            "0b:" => Some(NumeralBase::Bin),
            "0o:" => Some(NumeralBase::Oct),
            "0d:" => Some(NumeralBase::Dec),
            "0x:" | "0x" => Some(NumeralBase::Hex),
            _ => None,
        }
    }
}

impl fmt::Display for NumeralBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nom = match self {
            NumeralBase::Bin => "bin",
            NumeralBase::Oct => "oct",
            NumeralBase::Dec => "dec",
            NumeralBase::Hex => "hex",
        };
        f.write_str(nom)
    }
}

/* ------------------------ Conversion entière ------------------------ */

/// Convertit un entier écrit dans `from` vers `to`.
///
/// Un marqueur explicite en tête ("0x:FF") l’emporte sur `from`.
/// Les séparateurs de groupes (espaces, apostrophes) sont ignorés.
/// Seuls les entiers sont convertibles : "1.5" ou "1/3" donnent `NotAnInteger`.
pub fn convert_integer(
    texte: &str,
    from: NumeralBase,
    to: NumeralBase,
) -> Result<String, ConversionError> {
    let s = texte.trim();
    if s.is_empty() {
        return Err(ConversionError::Empty);
    }

    let (negatif, reste) = match s.strip_prefix('-') {
        Some(r) => (true, r.trim_start()),
        None => (false, s),
    };

    let (base, corps) = lire_marqueur(reste).unwrap_or((from, reste));

    let mut chiffres = String::with_capacity(corps.len());
    for c in corps.chars() {
        if c.is_whitespace() || c == '\'' {
            continue;
        }
        if c == '.' || c == '/' {
            return Err(ConversionError::NotAnInteger(texte.trim().to_string()));
        }
        if !base.accepts(c) {
            return Err(ConversionError::InvalidDigit { digit: c, base });
        }
        chiffres.push(c);
    }
    if chiffres.is_empty() {
        return Err(ConversionError::Empty);
    }

    let n = BigInt::parse_bytes(chiffres.as_bytes(), base.radix())
        .ok_or_else(|| ConversionError::NotAnInteger(texte.trim().to_string()))?;
    let n = if negatif { -n } else { n };

    Ok(format_integer(&n, to))
}

/// Écrit un entier dans la base voulue, sans marqueur (hex en majuscules).
pub fn format_integer(n: &BigInt, base: NumeralBase) -> String {
    let chiffres = n.abs().to_str_radix(base.radix()).to_uppercase();
    if n.is_negative() {
        format!("-{chiffres}")
    } else {
        chiffres
    }
}

fn lire_marqueur(s: &str) -> Option<(NumeralBase, &str)> {
    for base in NumeralBase::TOUTES {
        if let Some(reste) = s.strip_prefix(base.prefix()) {
            return Some((base, reste));
        }
    }
    s.strip_prefix("0x").map(|reste| (NumeralBase::Hex, reste))
}
