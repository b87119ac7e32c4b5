// src/journal.rs
//
// Journalisation : abonné fmt + filtre d’environnement.
// CALC_LOG (syntaxe EnvFilter, ex: "calculatrice_flux=debug"), défaut "info".

use tracing_subscriber::{fmt, EnvFilter};

pub const VARIABLE_FILTRE: &str = "CALC_LOG";

/// Installe l’abonné global. Un second appel ne fait rien.
pub fn init_journal() {
    let filtre = EnvFilter::try_from_env(VARIABLE_FILTRE).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filtre)
        .with_target(true)
        .with_thread_names(true)
        .try_init();
}
