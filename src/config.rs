// src/config.rs
//
// Configuration de l’orchestrateur (valeurs par défaut + bornes).
// Lecture optionnelle de l’environnement par-dessus les défauts.

use std::time::Duration;

pub const TAILLE_POOL_DEFAUT: usize = 10;
pub const TAILLE_POOL_MAX: usize = 64;

/// Intervalle de revalidation des préférences moteur.
pub const INTERVALLE_PREFERENCES_DEFAUT: Duration = Duration::from_secs(60);

/// Décimales d’un résultat numérique.
pub const CHIFFRES_DEFAUT: usize = 20;
pub const CHIFFRES_MAX: usize = 200;

/// Profondeur maximale d’une expression (au-delà : "expression trop complexe").
pub const PROFONDEUR_MAX_DEFAUT: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub taille_pool: usize,
    pub intervalle_preferences: Duration,
    pub chiffres: usize,
    pub profondeur_max: usize,
    pub evaluation_live: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            taille_pool: TAILLE_POOL_DEFAUT,
            intervalle_preferences: INTERVALLE_PREFERENCES_DEFAUT,
            chiffres: CHIFFRES_DEFAUT,
            profondeur_max: PROFONDEUR_MAX_DEFAUT,
            evaluation_live: true,
        }
    }
}

impl Configuration {
    /// Défauts, puis CALC_TAILLE_POOL / CALC_CHIFFRES / CALC_EVALUATION_LIVE si présents.
    pub fn depuis_env() -> Self {
        let mut c = Self::default();
        if let Some(n) = parse_env_usize("CALC_TAILLE_POOL") {
            c.set_taille_pool(n);
        }
        if let Some(n) = parse_env_usize("CALC_CHIFFRES") {
            c.set_chiffres(n);
        }
        if let Some(b) = parse_env_bool("CALC_EVALUATION_LIVE") {
            c.evaluation_live = b;
        }
        c
    }

    pub fn set_taille_pool(&mut self, n: usize) {
        self.taille_pool = n.clamp(1, TAILLE_POOL_MAX);
    }

    pub fn set_chiffres(&mut self, n: usize) {
        self.chiffres = n.min(CHIFFRES_MAX);
    }

    pub fn set_profondeur_max(&mut self, n: usize) {
        self.profondeur_max = n.max(1);
    }

    pub fn avec_intervalle_preferences(mut self, d: Duration) -> Self {
        self.intervalle_preferences = d;
        self
    }
}

fn parse_env_usize(cle: &str) -> Option<usize> {
    std::env::var(cle).ok()?.trim().parse().ok()
}

fn parse_env_bool(cle: &str) -> Option<bool> {
    match std::env::var(cle) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "oui" => Some(true),
            "0" | "false" | "no" | "off" | "non" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}
