// src/bus.rs
//
// Bus d’événements : un seul thread séquenceur ("calc-evenements").
//
// - publish() ne fait qu’enfiler (jamais bloquant au-delà de l’envoi)
// - ordre total : celui des envois dans le canal, quel que soit le thread producteur
// - chaque événement est livré à un instantané de la liste des écouteurs
// - panique d’un écouteur : journalisée, les suivants sont servis quand même
// - flush() : attend la livraison de tout ce qui a été enfilé avant l’appel

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::evenements::{Ecouteur, EventData, Evenement, FIRST_ID};

type Ecouteurs = Arc<RwLock<Vec<Arc<dyn Ecouteur>>>>;

enum Commande {
    Livrer(EventData, Evenement),
    Barriere(Sender<()>),
}

pub struct EventBus {
    ecouteurs: Ecouteurs,
    compteur: AtomicU64,
    envoi: Option<Sender<Commande>>,
    sequenceur: Option<JoinHandle<()>>,
    id_sequenceur: ThreadId,
}

impl EventBus {
    pub fn new() -> Self {
        let ecouteurs: Ecouteurs = Arc::new(RwLock::new(Vec::new()));
        let (tx, rx) = unbounded::<Commande>();

        let pour_thread = ecouteurs.clone();
        let sequenceur = thread::Builder::new()
            .name("calc-evenements".into())
            .spawn(move || {
                for cmd in rx {
                    match cmd {
                        Commande::Livrer(data, ev) => livrer(&pour_thread, &data, &ev),
                        Commande::Barriere(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                debug!("séquenceur arrêté");
            })
            .expect("lancement du thread séquenceur");

        let id_sequenceur = sequenceur.thread().id();
        Self {
            ecouteurs,
            compteur: AtomicU64::new(FIRST_ID),
            envoi: Some(tx),
            sequenceur: Some(sequenceur),
            id_sequenceur,
        }
    }

    pub fn subscribe(&self, ecouteur: Arc<dyn Ecouteur>) {
        self.ecouteurs.write().push(ecouteur);
    }

    /// Retire l’écouteur (identité de pointeur). Renvoie false s’il n’était pas inscrit.
    pub fn unsubscribe(&self, ecouteur: &Arc<dyn Ecouteur>) -> bool {
        let cible = Arc::as_ptr(ecouteur) as *const ();
        let mut liste = self.ecouteurs.write();
        let avant = liste.len();
        liste.retain(|e| Arc::as_ptr(e) as *const () != cible);
        liste.len() != avant
    }

    pub fn listener_count(&self) -> usize {
        self.ecouteurs.read().len()
    }

    /// Dernier identifiant distribué (FIRST_ID si aucun).
    pub fn dernier_id(&self) -> u64 {
        self.compteur.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.compteur.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Nouvelle chaîne : sequence_id = event_id.
    pub fn next_event_data(&self) -> EventData {
        let id = self.next_id();
        EventData {
            event_id: id,
            sequence_id: id,
        }
    }

    /// Nouvel événement rattaché à une chaîne existante.
    pub fn next_in_sequence(&self, sequence_id: u64) -> EventData {
        EventData {
            event_id: self.next_id(),
            sequence_id,
        }
    }

    pub fn publish(&self, data: EventData, evenement: Evenement) {
        trace!(event_id = data.event_id, sequence_id = data.sequence_id, type_ = ?evenement.type_evenement(), "publication");
        if let Some(tx) = &self.envoi {
            if tx.send(Commande::Livrer(data, evenement)).is_err() {
                error!(event_id = data.event_id, "séquenceur indisponible, événement perdu");
            }
        }
    }

    /// Publie dans une nouvelle chaîne.
    pub fn fire(&self, evenement: Evenement) -> EventData {
        let data = self.next_event_data();
        self.publish(data, evenement);
        data
    }

    pub fn fire_in_sequence(&self, sequence_id: u64, evenement: Evenement) -> EventData {
        let data = self.next_in_sequence(sequence_id);
        self.publish(data, evenement);
        data
    }

    /// Bloque jusqu’à la livraison de tout ce qui précède.
    /// Sans effet depuis le séquenceur lui-même (un écouteur ne peut pas s’attendre).
    pub fn flush(&self) {
        if thread::current().id() == self.id_sequenceur {
            return;
        }
        let Some(tx) = &self.envoi else { return };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(Commande::Barriere(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        // fermer le canal termine la boucle du séquenceur après vidage
        self.envoi.take();
        if let Some(h) = self.sequenceur.take() {
            if thread::current().id() != self.id_sequenceur {
                let _ = h.join();
            }
        }
    }
}

fn livrer(ecouteurs: &Ecouteurs, data: &EventData, ev: &Evenement) {
    // instantané : (dés)inscriptions concurrentes sans effet sur cette livraison
    let instantane: Vec<Arc<dyn Ecouteur>> = ecouteurs.read().clone();

    for e in instantane {
        let r = panic::catch_unwind(AssertUnwindSafe(|| e.on_event(data, ev)));
        if r.is_err() {
            error!(
                event_id = data.event_id,
                sequence_id = data.sequence_id,
                type_ = ?ev.type_evenement(),
                "écouteur en panique, livraison poursuivie"
            );
        }
    }
}
