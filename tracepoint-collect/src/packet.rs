//! Chunking of collection entries into bounded wire packets

/// Accumulates entries into packets of at most `budget` characters
///
/// Each entry reserves a budget before it is appended; if the reservation
/// does not fit in the open packet, the packet is closed first. An entry
/// longer than its nominal reservation reserves its real length instead. An
/// entry larger than the whole budget still goes out, alone in its packet.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    budget: usize,
    packets: Vec<String>,
    current: String,
}

impl PacketBuilder {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            packets: Vec::new(),
            current: String::new(),
        }
    }

    /// Emit `packet` on its own, closing the open packet first
    pub fn push_standalone(&mut self, packet: String) {
        self.flush();
        self.packets.push(packet);
    }

    /// Close the open packet if `reserve` more characters would overflow it
    pub fn flush_if_exceeds(&mut self, reserve: usize) {
        if self.current.len() + reserve > self.budget {
            self.flush();
        }
    }

    /// Append `entry`, budgeted at `reserve` characters or its length,
    /// whichever is larger
    pub fn push(&mut self, entry: &str, reserve: usize) {
        self.flush_if_exceeds(reserve.max(entry.len()));
        self.current.push_str(entry);
    }

    /// Close the open packet unless it is empty
    pub fn flush(&mut self) {
        if !self.current.is_empty() {
            self.packets.push(std::mem::take(&mut self.current));
        }
    }

    /// Close the open packet and return everything emitted
    pub fn finish(mut self) -> Vec<String> {
        self.flush();
        self.packets
    }
}
