// src/noyau/lecture.rs
//
// Lecture décimale d’une Expr : entier “scalé” (×10^digits), tronqué.
// - π : formule de Machin, cache par nombre de chiffres
// - √ : Newton entier
// - puissance : exposant entier (ou demi-entier via √)
// Chaque nœud passe par un point d’interruption.

use std::collections::HashMap;
use std::sync::OnceLock;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use parking_lot::Mutex;

use super::expr::{exposant_entier, int_sqrt_floor, rational_pow_int, Expr, EXPOSANT_MAX};
use crate::erreur::EngineError;
use crate::moteur::Annulation;

/// Chiffres de garde ajoutés aux calculs intermédiaires.
pub const GARDE: usize = 10;

/* ------------------------ Décimal (scaled -> texte) ------------------------ */

fn pow10(n: usize) -> BigInt {
    BigInt::from(10).pow(n as u32)
}

/// Convertit un entier “scalé” (×10^digits) en texte décimal tronqué.
pub fn scaled_to_decimal(mut scaled: BigInt, digits: usize) -> String {
    let neg = scaled.is_negative();
    if neg {
        scaled = -scaled;
    }

    let scale = pow10(digits);
    let int_part = &scaled / &scale;
    let frac_part = &scaled % &scale;

    let signe = if neg { "-" } else { "" };

    if digits == 0 {
        return format!("{signe}{int_part}");
    }

    let mut frac = frac_part.to_str_radix(10);
    while frac.len() < digits {
        frac.insert(0, '0');
    }

    format!("{signe}{int_part}.{frac}")
}

/// Retire les zéros finaux d’une partie décimale (et le point s’il ne reste rien).
pub fn trim_decimal(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let t = s.trim_end_matches('0').trim_end_matches('.');
    if t == "-0" {
        "0".to_string()
    } else {
        t.to_string()
    }
}

/// r -> entier “scalé” = trunc(r * 10^digits)
fn rational_scaled(r: &BigRational, digits: usize) -> BigInt {
    let scale = pow10(digits);
    (r.numer() * scale) / r.denom()
}

/// Écriture décimale d’un rationnel : exacte quand le développement est fini
/// en au plus `chiffres` décimales, tronquée sinon.
///
/// Renvoie (texte, exact).
pub fn decimal_exact(r: &BigRational, chiffres: usize) -> (String, bool) {
    // développement fini <=> dénominateur = 2^a * 5^b
    let mut d = r.denom().clone();
    let deux = BigInt::from(2);
    let cinq = BigInt::from(5);
    let (mut a, mut b) = (0usize, 0usize);
    while (&d % &deux).is_zero() {
        d /= &deux;
        a += 1;
    }
    while (&d % &cinq).is_zero() {
        d /= &cinq;
        b += 1;
    }
    let necessaires = a.max(b);
    let exact = d.is_one() && necessaires <= chiffres;
    let digits = if exact { necessaires } else { chiffres };

    let texte = trim_decimal(&scaled_to_decimal(rational_scaled(r, digits), digits));
    (texte, exact)
}

/* ------------------------ π (Machin) + cache ------------------------ */

/// arctan(1/q) en entier scalé (troncature) via série:
/// atan(z) = z - z^3/3 + z^5/5 - ...
fn arctan_inv_q_scaled(q: i64, scale: &BigInt) -> BigInt {
    let q = BigInt::from(q);

    let mut k: usize = 0;
    let mut sign_pos = true;

    // q^(2k+1)
    let mut q_pow = q.clone();
    let mut sum = BigInt::zero();

    loop {
        let denom = BigInt::from((2 * k + 1) as i64);
        let d = &q_pow * &denom;

        let term = scale / &d;
        if term.is_zero() {
            break;
        }

        if sign_pos {
            sum += &term;
        } else {
            sum -= &term;
        }

        q_pow *= &q;
        q_pow *= &q;

        sign_pos = !sign_pos;
        k += 1;
    }

    sum
}

fn pi_scaled_compute(digits: usize) -> BigInt {
    let scale = pow10(digits + GARDE);

    // Machin : π = 16*atan(1/5) - 4*atan(1/239)
    let a = arctan_inv_q_scaled(5, &scale);
    let b = arctan_inv_q_scaled(239, &scale);

    let pi = BigInt::from(16) * a - BigInt::from(4) * b;
    pi / pow10(GARDE)
}

static PI_CACHE: OnceLock<Mutex<HashMap<usize, BigInt>>> = OnceLock::new();

fn pi_scaled_cached(digits: usize) -> BigInt {
    let m = PI_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = m.lock();

    guard
        .entry(digits)
        .or_insert_with(|| pi_scaled_compute(digits))
        .clone()
}

/* ------------------------ Évaluation scalée ------------------------ */

/// Évalue une expression en entier “scalé” (×10^digits).
/// - Var : UndefinedVariable (toute variable doit avoir été substituée)
/// - division par zéro, √ d’un négatif : Arithmetic
/// - exposant trop grand : StackOverflow
pub fn eval_scaled(expr: &Expr, digits: usize, annulation: &Annulation) -> Result<BigInt, EngineError> {
    use Expr::*;

    annulation.verifier()?;
    let scale = pow10(digits);

    match expr {
        Var(nom) => Err(EngineError::UndefinedVariable(nom.clone())),

        Rat(r) => Ok(rational_scaled(r, digits)),
        Pi => Ok(pi_scaled_cached(digits)),

        Add(a, b) => Ok(eval_scaled(a, digits, annulation)? + eval_scaled(b, digits, annulation)?),
        Sub(a, b) => Ok(eval_scaled(a, digits, annulation)? - eval_scaled(b, digits, annulation)?),

        Mul(a, b) => {
            let sa = eval_scaled(a, digits, annulation)?;
            let sb = eval_scaled(b, digits, annulation)?;
            Ok((sa * sb) / &scale)
        }

        Div(a, b) => {
            let sa = eval_scaled(a, digits, annulation)?;
            let sb = eval_scaled(b, digits, annulation)?;
            if sb.is_zero() {
                return Err(EngineError::Arithmetic("division par zéro".into()));
            }
            Ok((sa * &scale) / sb)
        }

        Abs(x) => Ok(eval_scaled(x, digits, annulation)?.abs()),

        Sqrt(x) => {
            if let Rat(r) = x.as_ref() {
                if r.is_negative() {
                    return Err(racine_negative());
                }
                return Ok(rational_sqrt_scaled(r, digits));
            }
            let sx = eval_scaled(x, digits, annulation)?;
            sqrt_scaled(&sx, &scale)
        }

        Pow(base, exp) => pow_scaled(base, exp, digits, annulation),
    }
}

fn racine_negative() -> EngineError {
    EngineError::Arithmetic("racine carrée d’un nombre négatif".into())
}

/// √ d’une valeur déjà scalée : floor(√(sx * scale)).
fn sqrt_scaled(sx: &BigInt, scale: &BigInt) -> Result<BigInt, EngineError> {
    if sx.is_negative() {
        return Err(racine_negative());
    }
    Ok(int_sqrt_floor(&(sx * scale)))
}

fn pow_scaled(
    base: &Expr,
    exp: &Expr,
    digits: usize,
    annulation: &Annulation,
) -> Result<BigInt, EngineError> {
    let scale = pow10(digits);
    let e = exp.clone().simplify();

    // exposant demi-entier : x^(p/2) = (√x)^p
    let (n, racine) = match &e {
        Expr::Rat(r) if r.denom() == &BigInt::from(2) => {
            let p = exposant_entier(&Expr::Rat(BigRational::from_integer(r.numer().clone())))
                .ok_or(EngineError::StackOverflow)?;
            (p, true)
        }
        Expr::Rat(r) if r.denom().is_one() => {
            let n = exposant_entier(&e).ok_or(EngineError::StackOverflow)?;
            (n, false)
        }
        Expr::Rat(_) => {
            return Err(EngineError::Arithmetic("exposant fractionnaire non pris en charge".into()))
        }
        _ => {
            // exposant non rationnel : lu en décimal, doit tomber sur un entier
            let se = eval_scaled(&e, digits, annulation)?;
            if !(&se % &scale).is_zero() {
                return Err(EngineError::Arithmetic("exposant non entier".into()));
            }
            let n = exposant_entier(&Expr::Rat(BigRational::from_integer(se / &scale)))
                .ok_or(EngineError::StackOverflow)?;
            (n, false)
        }
    };
    debug_assert!(n.abs() <= EXPOSANT_MAX);

    // base rationnelle, exposant entier : calcul exact puis lecture
    if let (Expr::Rat(r), false) = (base, racine) {
        if r.is_zero() && n < 0 {
            return Err(EngineError::Arithmetic("division par zéro".into()));
        }
        let taille = r.numer().bits().max(r.denom().bits()) * n.unsigned_abs();
        if taille > 1_000_000 {
            return Err(EngineError::StackOverflow);
        }
        return Ok(rational_scaled(&rational_pow_int(r.clone(), n), digits));
    }

    let mut sb = eval_scaled(base, digits, annulation)?;
    if racine {
        sb = sqrt_scaled(&sb, &scale)?;
    }

    // exponentiation rapide en virgule fixe
    let mut e = n.unsigned_abs();
    let mut acc = scale.clone();
    let mut b = sb;
    while e > 0 {
        annulation.verifier()?;
        if (e & 1) == 1 {
            acc = (&acc * &b) / &scale;
        }
        e >>= 1;
        if e > 0 {
            b = (&b * &b) / &scale;
        }
    }

    if n < 0 {
        if acc.is_zero() {
            return Err(EngineError::Arithmetic("division par zéro".into()));
        }
        acc = (&scale * &scale) / acc;
    }
    Ok(acc)
}

/// sqrt(r) en entier scalé : floor( sqrt(r) * 10^digits ), r = n/d >= 0
fn rational_sqrt_scaled(r: &BigRational, digits: usize) -> BigInt {
    // sqrt(n/d) * 10^digits = sqrt(n * 10^(2*digits) / d)
    let target = (r.numer() * pow10(2 * digits)) / r.denom();
    int_sqrt_floor(&target)
}
