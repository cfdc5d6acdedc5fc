use crate::identity::Directory;
use crate::model::{PersonId, Rotation, Shift};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Canal de diffusion sortant. Les échecs sont journalisés par l'appelant.
pub trait Notifier: Send + Sync {
    fn notify(&self, person: &PersonId, message: &str) -> anyhow::Result<()>;
}

/// Motif d'un message envoyé aux membres d'un shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftNotice {
    Joined,
    Started,
    Finished,
    /// Rappel avant le début.
    Upcoming,
    /// Rappel avant la fin.
    Ending,
}

/// Permet de customiser le rendu du message (texte, chat, etc.).
pub trait MessageRenderer: Send + Sync {
    fn render(&self, name: &str, rotation: &Rotation, shift: &Shift, notice: ShiftNotice) -> String;
}

/// Gabarit texte simple.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextMessages;

impl MessageRenderer for TextMessages {
    fn render(&self, name: &str, rotation: &Rotation, shift: &Shift, notice: ShiftNotice) -> String {
        let what = match notice {
            ShiftNotice::Joined => "you have been added to",
            ShiftNotice::Started => "your shift has started:",
            ShiftNotice::Finished => "your shift is finished:",
            ShiftNotice::Upcoming => "your shift starts soon:",
            ShiftNotice::Ending => "your shift ends soon:",
        };
        format!(
            "Hi {name}, {what} {rotation} #{number} ({start} to {end}).",
            rotation = rotation.name,
            number = shift.number,
            start = shift.start.format("%Y-%m-%d"),
            end = shift.end.format("%Y-%m-%d"),
        )
    }
}

/// Envoie `notice` à chaque membre du shift ; renvoie le nombre d'envois réussis.
pub fn notify_members(
    notifier: &dyn Notifier,
    directory: &dyn Directory,
    renderer: &dyn MessageRenderer,
    rotation: &Rotation,
    shift: &Shift,
    notice: ShiftNotice,
) -> usize {
    let mut sent = 0;
    for id in &shift.members {
        let message = renderer.render(&directory.display_name(id), rotation, shift, notice);
        match notifier.notify(id, &message) {
            Ok(()) => sent += 1,
            Err(err) => warn!(person = %id, error = %err, "notification failed"),
        }
    }
    sent
}

/// Conserve les messages en mémoire (tests, affichage CLI).
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<(PersonId, String)>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(PersonId, String)> {
        self.sent().clone()
    }

    pub fn drain(&self) -> Vec<(PersonId, String)> {
        std::mem::take(&mut *self.sent())
    }

    /// Un verrou empoisonné garde une liste cohérente : on la reprend telle quelle.
    fn sent(&self) -> MutexGuard<'_, Vec<(PersonId, String)>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Notifier for Outbox {
    fn notify(&self, person: &PersonId, message: &str) -> anyhow::Result<()> {
        self.sent().push((person.clone(), message.to_string()));
        Ok(())
    }
}
