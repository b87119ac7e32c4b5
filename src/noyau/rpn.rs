// src/noyau/rpn.rs
//
// Shunting-yard -> RPN -> AST
//
// Précédences : + - (1) < * / (2) < moins unaire (3) < ^ (4, droite) < fonction (5)
// - moins unaire : '-' quand on n’attend PAS une valeur => Tok::Neg (préfixe)
//   "-2^2" = -(2^2) ; "2^-1" = 2^(-1)
// - plus unaire : ignoré
// - fonction : préfixe, sortie après sa parenthèse fermante, ou dépilée par
//   un opérateur binaire quand elle s’applique à un atome ("√4+1" = (√4)+1)
//
// from_rpn borne la profondeur de l’arbre : au-delà, StackOverflow.

use num_rational::BigRational;
use num_traits::Zero;

use super::expr::Expr;
use super::jetons::Tok;
use crate::erreur::EngineError;
use crate::math_type::FONCTIONS;

fn precedence(t: &Tok) -> i32 {
    match t {
        Tok::Plus | Tok::Minus => 1,
        Tok::Star | Tok::Slash => 2,
        Tok::Neg => 3,
        Tok::Caret => 4,
        Tok::Ident(_) => 5,
        _ => 0,
    }
}

fn is_right_associative(t: &Tok) -> bool {
    matches!(t, Tok::Caret)
}

fn is_fonction_ident(name: &str) -> bool {
    FONCTIONS.contains(&name)
}

fn is_fonction(t: &Tok) -> bool {
    matches!(t, Tok::Ident(name) if is_fonction_ident(name))
}

/// Convertit une suite de jetons en RPN (notation polonaise inversée).
///
/// Exemple:
///   tokens: [Ident("sqrt"), LPar, Num(2), Plus, Pi, RPar]
///   rpn:    [Num(2), Pi, Plus, Ident("sqrt")]
pub fn to_rpn(tokens: &[Tok]) -> Result<Vec<Tok>, EngineError> {
    let mut out: Vec<Tok> = Vec::new();
    let mut ops: Vec<Tok> = Vec::new();

    // “valeur” = un atome ou une expression fermée.
    // Sert à détecter le moins unaire.
    let mut prev_was_value = false;

    for tok in tokens.iter().cloned() {
        match tok {
            Tok::Num(_) | Tok::Pi => {
                out.push(tok);
                prev_was_value = true;
            }

            Tok::Ident(ref name) => {
                if is_fonction_ident(name) {
                    // préfixe : reste sur la pile jusqu’à son argument
                    ops.push(tok);
                    prev_was_value = false;
                } else {
                    out.push(tok);
                    prev_was_value = true;
                }
            }

            Tok::LPar => {
                ops.push(tok);
                prev_was_value = false;
            }

            Tok::RPar => {
                let mut ferme = false;
                while let Some(top) = ops.pop() {
                    if matches!(top, Tok::LPar) {
                        ferme = true;
                        break;
                    }
                    out.push(top);
                }
                if !ferme {
                    return Err(EngineError::parse("parenthèse fermante sans ouvrante", None));
                }

                // f(...) : la fonction sort avec son argument
                if ops.last().is_some_and(is_fonction) {
                    if let Some(f) = ops.pop() {
                        out.push(f);
                    }
                }

                prev_was_value = true;
            }

            Tok::Minus | Tok::Plus if !prev_was_value => {
                if matches!(tok, Tok::Minus) {
                    ops.push(Tok::Neg);
                }
            }

            Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash | Tok::Caret => {
                while let Some(top) = ops.last() {
                    if matches!(top, Tok::LPar) {
                        break;
                    }

                    let p_top = precedence(top);
                    let p_tok = precedence(&tok);

                    let doit_pop = if is_right_associative(&tok) {
                        p_top > p_tok
                    } else {
                        p_top >= p_tok
                    };

                    if !doit_pop {
                        break;
                    }
                    if let Some(t) = ops.pop() {
                        out.push(t);
                    }
                }

                ops.push(tok);
                prev_was_value = false;
            }

            Tok::Neg => {
                ops.push(tok);
                prev_was_value = false;
            }
        }
    }

    // vide la pile ops
    while let Some(op) = ops.pop() {
        if matches!(op, Tok::LPar) {
            return Err(EngineError::parse("parenthèses non fermées", None));
        }
        out.push(op);
    }

    Ok(out)
}

/// Construit une Expr à partir d’une RPN, profondeur bornée.
pub fn from_rpn(rpn: &[Tok], profondeur_max: usize) -> Result<Expr, EngineError> {
    // chaque entrée : (expression, profondeur)
    let mut st: Vec<(Expr, usize)> = Vec::new();

    let invalide = || EngineError::parse("expression invalide", None);

    for tok in rpn.iter().cloned() {
        let (e, p) = match tok {
            Tok::Num(r) => (Expr::Rat(r), 1),
            Tok::Pi => (Expr::Pi, 1),

            Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash | Tok::Caret => {
                let (b, pb) = st.pop().ok_or_else(invalide)?;
                let (a, pa) = st.pop().ok_or_else(invalide)?;
                let (a, b) = (Box::new(a), Box::new(b));

                let e = match tok {
                    Tok::Plus => Expr::Add(a, b),
                    Tok::Minus => Expr::Sub(a, b),
                    Tok::Star => Expr::Mul(a, b),
                    Tok::Slash => Expr::Div(a, b),
                    _ => Expr::Pow(a, b),
                };
                (e, pa.max(pb) + 1)
            }

            Tok::Neg => {
                let (x, px) = st.pop().ok_or_else(invalide)?;
                // -x => 0 - x (forme gardée par simplify pour le rendu)
                (
                    Expr::Sub(Box::new(Expr::Rat(BigRational::zero())), Box::new(x)),
                    px + 1,
                )
            }

            Tok::Ident(name) => {
                if is_fonction_ident(&name) {
                    let (x, px) = st
                        .pop()
                        .ok_or_else(|| EngineError::parse(format!("{name} sans argument"), None))?;
                    let e = match name.as_str() {
                        "abs" => Expr::Abs(Box::new(x)),
                        _ => Expr::Sqrt(Box::new(x)),
                    };
                    (e, px + 1)
                } else {
                    (Expr::Var(name), 1)
                }
            }

            Tok::LPar | Tok::RPar => {
                return Err(EngineError::parse("parenthèse inattendue en RPN", None))
            }
        };

        if p > profondeur_max {
            return Err(EngineError::StackOverflow);
        }
        st.push((e, p));
    }

    if st.len() != 1 {
        return Err(invalide());
    }
    st.pop().map(|(e, _)| e).ok_or_else(invalide)
}
