// src/noyau/expr.rs
//
// AST exact (sans flottants).
// - Rat : rationnel exact
// - Pi  : symbole π
// - Var : variable symbolique (ex: x) ; jamais “devinée” par simplify
//
// IMPORTANT (SAFE):
// - une division par zéro reste symbolique dans l’arbre ; elle est signalée
//   par division_par_zero() avant toute simplification qui pourrait l’effacer
// - puissances : exposant entier borné, sinon la forme reste symbolique

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use std::fmt;

/// |n| maximal d’un exposant calculé exactement.
pub const EXPOSANT_MAX: i64 = 10_000;

/// Taille maximale (en bits) d’une puissance calculée exactement.
const BITS_PUISSANCE_MAX: u64 = 1_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Rat(BigRational),
    Pi,
    Var(String),

    Sqrt(Box<Expr>),
    Abs(Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),

    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Simplification locale (SAFE), sans heuristiques.
    /// Objectif: réduire ce qui est strictement démontrable sans exploser l’arbre.
    pub fn simplify(self) -> Expr {
        use Expr::*;

        match self {
            // Feuilles: aucune simplification à faire
            Rat(_) | Pi | Var(_) => self,

            Add(a, b) => {
                let a = a.simplify();
                let b = b.simplify();
                match (&a, &b) {
                    (Rat(x), Rat(y)) => Rat(x + y),
                    (Rat(x), _) if x.is_zero() => b,
                    (_, Rat(y)) if y.is_zero() => a,
                    _ => Add(Box::new(a), Box::new(b)),
                }
            }

            Sub(a, b) => {
                let a = a.simplify();
                let b = b.simplify();

                // x - x => 0
                if a == b {
                    return Rat(BigRational::zero());
                }

                match (&a, &b) {
                    (Rat(x), Rat(y)) => Rat(x - y),
                    (_, Rat(y)) if y.is_zero() => a,
                    (Rat(x), _) if x.is_zero() => {
                        // 0 - b => on garde Sub(0,b) (utile pour signes / rendu)
                        Sub(Box::new(Rat(BigRational::zero())), Box::new(b))
                    }
                    _ => Sub(Box::new(a), Box::new(b)),
                }
            }

            Mul(a, b) => {
                let a = a.simplify();
                let b = b.simplify();

                // coefficients rationnels regroupés à gauche (2*π plutôt que π*2)
                let (ca, ra) = coefficient(a);
                let (cb, rb) = coefficient(b);
                let reste = match (ra, rb) {
                    (None, None) => None,
                    (Some(x), None) | (None, Some(x)) => Some(x),
                    (Some(x), Some(y)) => Some(produit(x, y)),
                };
                avec_coefficient(ca * cb, reste)
            }

            Div(a, b) => {
                let a = a.simplify();
                let b = b.simplify();

                // division par zéro : on garde symbolique ici
                if let Rat(y) = &b {
                    if y.is_zero() {
                        return Div(Box::new(a), Box::new(b));
                    }
                }

                // √u / √v => √(u/v) si u,v rationnels > 0
                if let (Sqrt(u), Sqrt(v)) = (&a, &b) {
                    if let (Rat(ru), Rat(rv)) = (u.as_ref(), v.as_ref()) {
                        if ru.is_positive() && rv.is_positive() {
                            return Sqrt(Box::new(Rat(ru / rv))).simplify();
                        }
                    }
                }

                if a == b && !matches!(a, Rat(_)) && !contient_var(&a) {
                    return Rat(BigRational::one());
                }

                match (&a, &b) {
                    // a/k => (1/k)*a
                    (_, Rat(y)) => avec_coefficient(y.recip(), Some(a)),

                    // (p/q) / √n  => (p/qn) * √n, si n entier > 0
                    (Rat(x), Sqrt(inner)) => {
                        if let Rat(rn) = &**inner {
                            if rn.is_positive() && rn.denom().is_one() {
                                let x_over_n = x / rn;
                                return Mul(Box::new(Rat(x_over_n)), Box::new(Sqrt(inner.clone())))
                                    .simplify();
                            }
                        }
                        Div(Box::new(a), Box::new(b))
                    }

                    _ => Div(Box::new(a), Box::new(b)),
                }
            }

            Pow(base, exp) => {
                let base = base.simplify();
                let exp = exp.simplify();

                let Some(n) = exposant_entier(&exp) else {
                    return Pow(Box::new(base), Box::new(exp));
                };
                if n == 0 {
                    return Rat(BigRational::one());
                }
                if n == 1 {
                    return base;
                }
                if let Rat(r) = &base {
                    if puissance_calculable(r, n) {
                        return Rat(rational_pow_int(r.clone(), n));
                    }
                }
                // (c*x)^n => c^n * x^n
                if let Mul(c, x) = &base {
                    if let Rat(c) = c.as_ref() {
                        if puissance_calculable(c, n) {
                            let cn = Rat(rational_pow_int(c.clone(), n));
                            return Mul(Box::new(cn), Box::new(Pow(x.clone(), Box::new(exp)))).simplify();
                        }
                    }
                }
                // (√x)^2k => x^k
                if let (Sqrt(x), true) = (&base, n % 2 == 0) {
                    let k = Rat(BigRational::from_integer(BigInt::from(n / 2)));
                    return Pow(x.clone(), Box::new(k)).simplify();
                }
                Pow(Box::new(base), Box::new(exp))
            }

            Sqrt(x) => {
                let x = x.simplify();
                if let Rat(r) = &x {
                    if let Some(s) = rational_sqrt_exact(r) {
                        return Rat(s);
                    }
                    if !r.is_negative() {
                        return racine_reduite(r);
                    }
                }
                Sqrt(Box::new(x))
            }

            Abs(x) => {
                let x = x.simplify();
                match x {
                    Rat(r) => Rat(r.abs()),
                    Pi | Sqrt(_) | Abs(_) => x,
                    _ => Abs(Box::new(x)),
                }
            }
        }
    }

    /// Première variable rencontrée (parcours gauche -> droite).
    pub fn premiere_var(&self) -> Option<&str> {
        use Expr::*;
        match self {
            Var(s) => Some(s),
            Rat(_) | Pi => None,
            Sqrt(x) | Abs(x) => x.premiere_var(),
            Pow(a, b) | Add(a, b) | Sub(a, b) | Mul(a, b) | Div(a, b) => {
                a.premiere_var().or_else(|| b.premiere_var())
            }
        }
    }

    /// Profondeur de l’arbre (une feuille = 1).
    pub fn profondeur(&self) -> usize {
        use Expr::*;
        match self {
            Rat(_) | Pi | Var(_) => 1,
            Sqrt(x) | Abs(x) => x.profondeur() + 1,
            Pow(a, b) | Add(a, b) | Sub(a, b) | Mul(a, b) | Div(a, b) => {
                a.profondeur().max(b.profondeur()) + 1
            }
        }
    }

    /// Remplace chaque Var par f(nom) quand f renvoie une expression.
    pub fn remplacer_vars<E>(
        self,
        f: &mut impl FnMut(&str) -> Result<Option<Expr>, E>,
    ) -> Result<Expr, E> {
        use Expr::*;
        Ok(match self {
            Var(nom) => match f(&nom)? {
                Some(e) => e,
                None => Var(nom),
            },
            Rat(_) | Pi => self,
            Sqrt(x) => Sqrt(Box::new(x.remplacer_vars(f)?)),
            Abs(x) => Abs(Box::new(x.remplacer_vars(f)?)),
            Pow(a, b) => Pow(Box::new(a.remplacer_vars(f)?), Box::new(b.remplacer_vars(f)?)),
            Add(a, b) => Add(Box::new(a.remplacer_vars(f)?), Box::new(b.remplacer_vars(f)?)),
            Sub(a, b) => Sub(Box::new(a.remplacer_vars(f)?), Box::new(b.remplacer_vars(f)?)),
            Mul(a, b) => Mul(Box::new(a.remplacer_vars(f)?), Box::new(b.remplacer_vars(f)?)),
            Div(a, b) => Div(Box::new(a.remplacer_vars(f)?), Box::new(b.remplacer_vars(f)?)),
        })
    }

    /// Une division (ou puissance négative) par zéro exact apparaît-elle quelque part ?
    ///
    /// À tester AVANT simplify : 0*(1/0) deviendrait 0.
    pub fn division_par_zero(&self) -> bool {
        use Expr::*;
        match self {
            Rat(_) | Pi | Var(_) => false,
            Sqrt(x) | Abs(x) => x.division_par_zero(),
            Div(a, b) => {
                a.division_par_zero() || b.division_par_zero() || est_zero(&b.as_ref().clone().simplify())
            }
            Pow(a, b) => {
                if a.division_par_zero() || b.division_par_zero() {
                    return true;
                }
                let negatif = exposant_entier(&b.as_ref().clone().simplify()).is_some_and(|n| n < 0);
                negatif && est_zero(&a.as_ref().clone().simplify())
            }
            Add(a, b) | Sub(a, b) | Mul(a, b) => a.division_par_zero() || b.division_par_zero(),
        }
    }
}

/// Sépare e en (coefficient rationnel, reste éventuel).
fn coefficient(e: Expr) -> (BigRational, Option<Expr>) {
    match e {
        Expr::Rat(r) => (r, None),
        Expr::Mul(c, x) => match *c {
            Expr::Rat(r) => (r, Some(*x)),
            c => (BigRational::one(), Some(Expr::Mul(Box::new(c), x))),
        },
        e => (BigRational::one(), Some(e)),
    }
}

/// c * reste, sous forme normale (coefficient à gauche, 0 et 1 absorbés).
fn avec_coefficient(c: BigRational, reste: Option<Expr>) -> Expr {
    let Some(reste) = reste else {
        return Expr::Rat(c);
    };
    let (c2, reste) = coefficient(reste);
    let c = c * c2;
    match reste {
        None => Expr::Rat(c),
        Some(_) if c.is_zero() => Expr::Rat(c),
        Some(x) if c.is_one() => x,
        Some(x) => Expr::Mul(Box::new(Expr::Rat(c)), Box::new(x)),
    }
}

/// Produit de deux facteurs sans coefficient.
fn produit(x: Expr, y: Expr) -> Expr {
    use Expr::*;
    match (x, y) {
        // √u * √u => u
        (Sqrt(u), Sqrt(v)) if u == v => *u,
        // √u * √v => √(u*v) si u,v rationnels >= 0
        (Sqrt(u), Sqrt(v)) => match (*u, *v) {
            (Rat(ru), Rat(rv)) if !ru.is_negative() && !rv.is_negative() => {
                Sqrt(Box::new(Rat(ru * rv))).simplify()
            }
            (u, v) => Mul(Box::new(Sqrt(Box::new(u))), Box::new(Sqrt(Box::new(v)))),
        },
        (x, y) => Mul(Box::new(x), Box::new(y)),
    }
}

/// √r (r >= 0, non carré) : √(p/q) = √(pq)/q, puis sortie des facteurs carrés.
fn racine_reduite(r: &BigRational) -> Expr {
    let q = r.denom().clone();
    let mut n = r.numer() * &q;
    let mut k = BigInt::one();

    let mut f = BigInt::from(2);
    let limite = BigInt::from(FACTEUR_CARRE_MAX);
    while f <= limite && &f * &f <= n {
        let f2 = &f * &f;
        while (&n % &f2).is_zero() {
            n /= &f2;
            k *= &f;
        }
        f += 1u32;
    }

    let racine = Expr::Sqrt(Box::new(Expr::Rat(BigRational::from_integer(n))));
    avec_coefficient(BigRational::new(k, q), Some(racine))
}

/// Plus grand facteur testé pour sortir un carré d’une racine.
const FACTEUR_CARRE_MAX: u32 = 1_000;

fn puissance_calculable(r: &BigRational, n: i64) -> bool {
    let taille = r.numer().bits().max(r.denom().bits()) * n.unsigned_abs();
    taille <= BITS_PUISSANCE_MAX && !(r.is_zero() && n < 0)
}

fn est_zero(e: &Expr) -> bool {
    matches!(e, Expr::Rat(r) if r.is_zero())
}

fn contient_var(e: &Expr) -> bool {
    e.premiere_var().is_some()
}

/// Exposant entier raisonnable, si l’expression (simplifiée) en est un.
pub(crate) fn exposant_entier(e: &Expr) -> Option<i64> {
    let Expr::Rat(r) = e else { return None };
    if !r.denom().is_one() {
        return None;
    }
    let n: i64 = r.numer().to_string().parse().ok()?;
    (n.abs() <= EXPOSANT_MAX).then_some(n)
}

/* ------------------------ Affichage debug (pas “joli” final) ------------------------ */

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Expr::*;
        match self {
            Rat(r) => {
                let n = r.numer();
                let d = r.denom();
                if d.is_one() {
                    write!(f, "{n}")
                } else {
                    write!(f, "{n}/{d}")
                }
            }
            Pi => write!(f, "π"),
            Var(s) => write!(f, "{s}"),
            Sqrt(x) => write!(f, "√({x})"),
            Abs(x) => write!(f, "abs({x})"),
            Pow(x, n) => write!(f, "({x})^({n})"),
            Add(a, b) => write!(f, "({a}+{b})"),
            Sub(a, b) => write!(f, "({a}-{b})"),
            Mul(a, b) => write!(f, "({a}*{b})"),
            Div(a, b) => write!(f, "({a}/{b})"),
        }
    }
}

/* ------------------------ Outils rationnels (utilisés par simplify) ------------------------ */

pub(crate) fn rational_pow_int(base: BigRational, exp: i64) -> BigRational {
    if exp == 0 {
        return BigRational::one();
    }
    if exp < 0 {
        let pos = rational_pow_int(base, -exp);
        return pos.recip();
    }

    let mut e = exp as u64;
    let mut acc = BigRational::one();
    let mut b = base;

    while e > 0 {
        if (e & 1) == 1 {
            acc *= b.clone();
        }
        e >>= 1;
        if e > 0 {
            b *= b.clone();
        }
    }
    acc
}

fn rational_sqrt_exact(r: &BigRational) -> Option<BigRational> {
    if r.is_negative() {
        return None;
    }
    let n = r.numer();
    let d = r.denom();
    let sn = int_sqrt_exact(n)?;
    let sd = int_sqrt_exact(d)?;
    Some(BigRational::new(sn, sd))
}

fn int_sqrt_exact(x: &BigInt) -> Option<BigInt> {
    if x.is_negative() {
        return None;
    }
    let s = int_sqrt_floor(x);
    if &s * &s == *x {
        Some(s)
    } else {
        None
    }
}

pub(crate) fn int_sqrt_floor(x: &BigInt) -> BigInt {
    if x.is_zero() || x.is_negative() {
        return BigInt::zero();
    }

    let mut y = approx_sqrt_start(x);
    loop {
        let y_next = (&y + (x / &y)) >> 1;
        if y_next >= y {
            let mut z = y_next;
            while (&z + 1u32) * (&z + 1u32) <= *x {
                z += 1u32;
            }
            while &z * &z > *x {
                z -= 1u32;
            }
            return z;
        }
        y = y_next;
    }
}

fn approx_sqrt_start(x: &BigInt) -> BigInt {
    let bits = x.bits();
    let half = bits.div_ceil(2);
    BigInt::one() << half
}
