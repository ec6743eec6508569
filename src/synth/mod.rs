// Module synth - Voices for the call and the drum kit for the beat loop

pub mod drums;
pub mod envelope;
pub mod oscillator;
pub mod voice;
pub mod voice_manager;
