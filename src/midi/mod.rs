// MIDI input: parsing, port lookup and capture backends

pub mod capture;
pub mod device;
pub mod event;
pub mod simulated;
