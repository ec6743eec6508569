// MIDI input port listing and lookup

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub index: usize,
    pub name: String,
    /// The first port is treated as the default device
    pub is_default: bool,
}

/// Describe port names as returned by a backend, in backend order
pub fn describe_ports(names: &[String]) -> Vec<MidiDeviceInfo> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| MidiDeviceInfo {
            index,
            name: name.clone(),
            is_default: index == 0,
        })
        .collect()
}

/// Find a port by name: exact match first, then a case-insensitive substring
/// (port names often carry a client prefix or a port number suffix).
pub fn find_port(names: &[String], wanted: &str) -> Option<usize> {
    if let Some(index) = names.iter().position(|name| name == wanted) {
        return Some(index);
    }
    let wanted = wanted.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&wanted))
}
