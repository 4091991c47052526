use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::debug;

use super::HardwareDevice;

pub const SOUND_START: u16 = 0xEFF0;

/// One note played by the sound device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub note: u8,
    /// In 1/60 s ticks.
    pub ticks: u8,
}

impl Tone {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.ticks as u64 * 1000 / 60)
    }
}

/// Single control byte: write a note, then its duration.
pub struct Sound {
    note: Option<u8>,
    tones: Sender<Tone>,
}

impl Sound {
    pub fn new(tones: Sender<Tone>) -> Self {
        Sound { note: None, tones }
    }
}

impl HardwareDevice for Sound {
    fn name(&self) -> &'static str {
        "sound"
    }

    fn size(&self) -> u16 {
        1
    }

    fn inspect(&self, _offset: u16) -> u8 {
        self.note.is_some() as u8
    }

    fn poke(&mut self, _offset: u16, value: u8) {
        match self.note.take() {
            None => self.note = Some(value),
            Some(note) => {
                let tone = Tone { note, ticks: value };
                debug!(?tone, "sound");
                // Nobody listening is fine.
                let _ = self.tones.send(tone);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_then_duration() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sound = Sound::new(tx);
        assert_eq!(sound.peek(0), 0);
        sound.poke(0, 60);
        assert_eq!(sound.peek(0), 1);
        assert!(rx.try_recv().is_err());
        sound.poke(0, 30);
        assert_eq!(sound.peek(0), 0);
        let tone = rx.try_recv().unwrap();
        assert_eq!(tone, Tone { note: 60, ticks: 30 });
        assert_eq!(tone.duration(), Duration::from_millis(500));
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let mut sound = Sound::new(tx);
        sound.poke(0, 1);
        sound.poke(0, 2);
        assert_eq!(sound.inspect(0), 0);
    }
}
