//! Spoken reminders and agent answers.
//!
//! Messages go through a single-consumer queue: one worker thread turns each
//! message into audio and plays it to completion before taking the next, so
//! two announcements never talk over each other.

use crate::service::CareService;
use crate::{Error, Medicine, Result};
use std::io::Write;
use std::process::Command;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Spoken by the "voice" button
pub const GREETING: &str =
    "Hello! This is your medical dispenser. Please take your medicines on time.";

/// Something that can play an audio payload to completion
pub trait AudioOutput: Send {
    fn play(&mut self, audio: &[u8]) -> Result<()>;
}

/// Plays audio by handing a temp file to an external program
pub struct CommandPlayer {
    program: String,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioOutput for CommandPlayer {
    fn play(&mut self, audio: &[u8]) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("pillbox-tts-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(audio)?;
        file.flush()?;

        let status = Command::new(&self.program).arg(file.path()).status()?;
        if !status.success() {
            return Err(Error::Other(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

/// Text for the reminder spoken when a dose falls due
pub fn reminder_message(medicine: &Medicine) -> String {
    let mut message = format!("It is time to take {}", medicine.name);
    if !medicine.dose.trim().is_empty() {
        message.push_str(&format!(", dose {}", medicine.dose.trim()));
    }
    message.push('.');
    if !medicine.instructions.trim().is_empty() {
        message.push_str(&format!(" {}.", medicine.instructions.trim().trim_end_matches('.')));
    }
    message
}

/// Handle to the speech worker
pub struct SpeechQueue {
    sender: Option<Sender<String>>,
    worker: Option<JoinHandle<usize>>,
}

impl SpeechQueue {
    /// Start the worker thread
    pub fn start<A>(service: Arc<dyn CareService>, mut output: A) -> Self
    where
        A: AudioOutput + 'static,
    {
        let (sender, receiver) = mpsc::channel::<String>();

        let worker = std::thread::spawn(move || {
            let mut spoken = 0;
            for message in receiver {
                let played = service
                    .synthesize(&message)
                    .and_then(|audio| output.play(&audio));
                match played {
                    Ok(()) => spoken += 1,
                    Err(e) => tracing::warn!("Could not speak {:?}: {}", message, e),
                }
            }
            spoken
        });

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Queue a message; returns immediately
    pub fn speak(&self, message: impl Into<String>) {
        let message = message.into();
        if message.trim().is_empty() {
            return;
        }
        if let Some(sender) = &self.sender {
            if sender.send(message).is_err() {
                tracing::warn!("Speech worker has stopped, dropping message");
            }
        }
    }

    /// Finish everything queued, then stop. Returns how many messages played.
    pub fn finish(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        self.sender.take();
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(spoken)) => spoken,
            Some(Err(_)) => {
                tracing::error!("Speech worker panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
