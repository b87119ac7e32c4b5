// src/noyau/format.rs
//
// Affichage EXACT “joli”, relisible par le moteur.
// - multiplication toujours explicite : 2*x, 3*π/2
// - coefficient rationnel sur un atome : √2/2, -π/2, 3*√5/4
// - 0 - x => -x ; a + (-b) => a-b
// - parenthèses seulement quand la précédence l’exige

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use super::expr::Expr;

// Précédences d’affichage (alignées sur rpn.rs).
const P_ADD: u8 = 1;
const P_MUL: u8 = 2;
const P_NEG: u8 = 3;
const P_POW: u8 = 4;
const P_ATOME: u8 = 5;

/// Formate une expression (simplifiée ou non) en texte relisible.
pub fn format_expr(e: &Expr) -> String {
    rendre(e).0
}

fn entoure(e: &Expr, min: u8) -> String {
    let (s, p) = rendre(e);
    if p < min {
        format!("({s})")
    } else {
        s
    }
}

fn format_rat(r: &BigRational) -> (String, u8) {
    let n = r.numer();
    let d = r.denom();
    if d.is_one() {
        let p = if n.is_negative() { P_NEG } else { P_ATOME };
        (format!("{n}"), p)
    } else {
        (format!("{n}/{d}"), P_MUL)
    }
}

/// (p/q)*x avec x atomique -> p*x/q ; x/q si p=1 ; -x/q si p=-1
fn format_coeff_atome(c: &BigRational, x: &str) -> (String, u8) {
    let p = c.numer();
    let q = c.denom();

    if p.is_zero() {
        return ("0".to_string(), P_ATOME);
    }

    let signe = if p.is_negative() { "-" } else { "" };
    let pa: BigInt = p.abs();
    let coeur = if pa.is_one() {
        x.to_string()
    } else {
        format!("{pa}*{x}")
    };

    if q.is_one() {
        if pa.is_one() {
            let prec = if p.is_negative() { P_NEG } else { P_ATOME };
            return (format!("{signe}{coeur}"), prec);
        }
        return (format!("{signe}{coeur}"), P_MUL);
    }
    (format!("{signe}{coeur}/{q}"), P_MUL)
}

/// Rendu + précédence du texte produit.
fn rendre(e: &Expr) -> (String, u8) {
    use Expr::*;

    match e {
        Rat(r) => format_rat(r),
        Pi => ("π".to_string(), P_ATOME),
        Var(s) => (s.clone(), P_ATOME),

        Sqrt(x) => {
            let (s, p) = rendre(x);
            let nu = matches!(x.as_ref(), Rat(r) if !r.is_negative() && r.denom().is_one())
                || (p == P_ATOME && !matches!(x.as_ref(), Sqrt(_) | Abs(_)));
            if nu {
                (format!("√{s}"), P_ATOME)
            } else {
                (format!("√({s})"), P_ATOME)
            }
        }

        Abs(x) => (format!("abs({})", format_expr(x)), P_ATOME),

        // ^ associatif à droite : base strictement au-dessus
        Pow(a, b) => (
            format!("{}^{}", entoure(a, P_POW + 1), entoure(b, P_POW)),
            P_POW,
        ),

        Mul(a, b) => {
            if let Rat(c) = a.as_ref() {
                let (sb, pb) = rendre(b);
                if pb == P_ATOME {
                    return format_coeff_atome(c, &sb);
                }
            }
            (
                format!("{}*{}", entoure(a, P_MUL), entoure(b, P_MUL + 1)),
                P_MUL,
            )
        }

        Div(a, b) => (
            format!("{}/{}", entoure(a, P_MUL), entoure(b, P_MUL + 1)),
            P_MUL,
        ),

        Sub(a, b) if matches!(a.as_ref(), Rat(r) if r.is_zero()) => {
            (format!("-{}", entoure(b, P_NEG)), P_NEG)
        }

        Add(a, b) => {
            let sa = entoure(a, P_ADD);
            let (sb, pb) = rendre(b);
            let s = match sb.strip_prefix('-') {
                // a + (-x) => a-x
                Some(reste) if pb > P_ADD => format!("{sa}-{reste}"),
                _ if pb > P_ADD => format!("{sa}+{sb}"),
                _ => format!("{sa}+({sb})"),
            };
            (s, P_ADD)
        }

        Sub(a, b) => {
            let sa = entoure(a, P_ADD);
            let (sb, pb) = rendre(b);
            let s = match sb.strip_prefix('-') {
                // a - (-x) => a+x
                Some(reste) if pb > P_ADD => format!("{sa}+{reste}"),
                _ if pb > P_ADD => format!("{sa}-{sb}"),
                _ => format!("{sa}-({sb})"),
            };
            (s, P_ADD)
        }
    }
}
