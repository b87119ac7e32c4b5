// src/pool.rs
//
// Pool d’évaluation : N threads nommés "calc-eval-N" alimentés par un canal.
// Les tâches sont indépendantes ; l’ordre des résultats est l’affaire du bus.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

type Tache = Box<dyn FnOnce() + Send + 'static>;

/// Pile des threads d’évaluation : les expressions profondes descendent récursivement.
const PILE_THREAD: usize = 8 * 1024 * 1024;

#[derive(Default)]
struct EnAttente {
    nombre: Mutex<usize>,
    vide: Condvar,
}

impl EnAttente {
    fn incrementer(&self) {
        *self.nombre.lock() += 1;
    }

    fn decrementer(&self) {
        let mut n = self.nombre.lock();
        *n = n.saturating_sub(1);
        if *n == 0 {
            self.vide.notify_all();
        }
    }
}

pub struct PoolEvaluation {
    envoi: Option<Sender<Tache>>,
    threads: Vec<JoinHandle<()>>,
    en_attente: Arc<EnAttente>,
}

impl PoolEvaluation {
    pub fn new(taille: usize) -> Self {
        let taille = taille.max(1);
        let (tx, rx) = unbounded::<Tache>();
        let en_attente = Arc::new(EnAttente::default());

        let threads = (0..taille)
            .map(|i| {
                let rx = rx.clone();
                let en_attente = en_attente.clone();
                thread::Builder::new()
                    .name(format!("calc-eval-{i}"))
                    .stack_size(PILE_THREAD)
                    .spawn(move || {
                        for tache in rx {
                            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(tache)).is_err() {
                                error!("tâche d’évaluation en panique");
                            }
                            en_attente.decrementer();
                        }
                    })
                    .expect("lancement d’un thread d’évaluation")
            })
            .collect();

        debug!(taille, "pool d’évaluation prêt");
        Self {
            envoi: Some(tx),
            threads,
            en_attente,
        }
    }

    pub fn taille(&self) -> usize {
        self.threads.len()
    }

    /// Enfile une tâche ; ne bloque jamais.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(tx) = &self.envoi else { return };
        self.en_attente.incrementer();
        if tx.send(Box::new(f)).is_err() {
            self.en_attente.decrementer();
            error!("pool arrêté, tâche abandonnée");
        }
    }

    /// Tâches enfilées ou en cours.
    pub fn en_attente(&self) -> usize {
        *self.en_attente.nombre.lock()
    }

    /// Attend que toutes les tâches enfilées soient terminées.
    pub fn attendre(&self) {
        let mut n = self.en_attente.nombre.lock();
        while *n > 0 {
            self.en_attente.vide.wait(&mut n);
        }
    }
}

impl Drop for PoolEvaluation {
    fn drop(&mut self) {
        self.envoi.take();
        let courant = thread::current().id();
        for h in self.threads.drain(..) {
            // dernier Arc relâché par une tâche : pas d’auto-jointure
            if h.thread().id() != courant {
                let _ = h.join();
            }
        }
    }
}
