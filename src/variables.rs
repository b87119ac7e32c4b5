// src/variables.rs
//
// Registre des constantes nommées : variables utilisateur, "ans" (réservée),
// "pi" (système). Partagé entre le prétraitement (variables indéfinies)
// et le moteur exact (substitution).

use std::collections::BTreeMap;

use parking_lot::RwLock;

/// Variable réservée : dernier résultat affiché.
pub const ANS: &str = "ans";
/// Constante système.
pub const PI: &str = "pi";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// Valeur sous forme d’expression (texte normalisé).
    pub value: String,
    pub description: Option<String>,
    /// Constante système : jamais supprimée.
    pub system: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            system: false,
        }
    }

    pub fn avec_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct VarsRegistry {
    vars: RwLock<BTreeMap<String, Variable>>,
}

impl VarsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registre avec les constantes système.
    pub fn with_defaults() -> Self {
        let reg = Self::new();
        reg.vars.write().insert(
            PI.to_string(),
            Variable {
                name: PI.to_string(),
                value: PI.to_string(),
                description: Some("rapport du périmètre au diamètre".into()),
                system: true,
            },
        );
        reg
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Variable> {
        self.vars.read().get(name).cloned()
    }

    /// Ajoute ou remplace ; renvoie l’ancienne valeur.
    pub fn save(&self, var: Variable) -> Option<Variable> {
        self.vars.write().insert(var.name.clone(), var)
    }

    /// Supprime une variable utilisateur (les constantes système restent).
    pub fn remove(&self, name: &str) -> Option<Variable> {
        let mut vars = self.vars.write();
        if vars.get(name).is_some_and(|v| v.system) {
            return None;
        }
        vars.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.read().keys().cloned().collect()
    }
}
