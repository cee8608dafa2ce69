//! Pending / cleared section tracking for card statements
//!
//! Card exports list "not yet posted" transactions in their own section,
//! introduced by a marker row, next to the billed transactions. Only rows
//! seen while `Active` are emitted.

/// Where the parser is within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    /// No column header seen yet
    SearchingForHeader,
    /// Inside a billed section with a known header
    Active,
    /// Inside a pending section
    Suspended,
}

/// What a row turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionEvent {
    Header,
    PendingMarker,
    ValidMarker,
    DataRow,
}

/// Pure transition function
///
/// `header_seen` decides where a valid marker leads from `Suspended`: rows can
/// only be emitted once column positions are known.
pub fn transition(state: SectionState, event: SectionEvent, header_seen: bool) -> SectionState {
    use SectionEvent::*;
    use SectionState::*;

    match (state, event) {
        (_, PendingMarker) => Suspended,
        (Suspended, ValidMarker) if header_seen => Active,
        (Suspended, ValidMarker) => SearchingForHeader,
        (SearchingForHeader, Header) => Active,
        (state, _) => state,
    }
}

#[derive(Debug, Clone)]
pub struct SectionMachine {
    state: SectionState,
    header_seen: bool,
}

impl Default for SectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionMachine {
    pub fn new() -> Self {
        Self {
            state: SectionState::SearchingForHeader,
            header_seen: false,
        }
    }

    pub fn state(&self) -> SectionState {
        self.state
    }

    /// Feed one event; returns true if the row should be emitted
    pub fn on(&mut self, event: SectionEvent) -> bool {
        if event == SectionEvent::Header {
            self.header_seen = true;
        }
        self.state = transition(self.state, event, self.header_seen);
        event == SectionEvent::DataRow && self.state == SectionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SectionEvent::*;
    use SectionState::*;

    #[test]
    fn test_transitions() {
        assert_eq!(transition(SearchingForHeader, Header, true), Active);
        assert_eq!(transition(SearchingForHeader, DataRow, false), SearchingForHeader);
        assert_eq!(transition(Active, PendingMarker, true), Suspended);
        assert_eq!(transition(SearchingForHeader, PendingMarker, false), Suspended);
        assert_eq!(transition(Suspended, ValidMarker, true), Active);
        assert_eq!(transition(Suspended, ValidMarker, false), SearchingForHeader);
        assert_eq!(transition(Suspended, Header, true), Suspended);
        assert_eq!(transition(Suspended, DataRow, true), Suspended);
        assert_eq!(transition(Active, ValidMarker, true), Active);
    }

    #[test]
    fn test_pending_marker_before_any_header_suspends() {
        assert_eq!(transition(SearchingForHeader, PendingMarker, false), Suspended);

        let mut machine = SectionMachine::new();
        assert!(!machine.on(PendingMarker));
        assert_eq!(machine.state(), Suspended);
        assert!(!machine.on(Header));
        assert_eq!(machine.state(), Suspended);
    }

    #[test]
    fn test_pending_rows_are_dropped() {
        let mut machine = SectionMachine::new();
        let events = [
            Header,
            PendingMarker,
            DataRow,
            DataRow,
            DataRow,
            ValidMarker,
            DataRow,
            DataRow,
        ];
        let emitted = events.iter().filter(|e| machine.on(**e)).count();
        assert_eq!(emitted, 2);
        assert_eq!(machine.state(), Active);
    }

    #[test]
    fn test_rows_before_header_are_dropped() {
        let mut machine = SectionMachine::new();
        assert!(!machine.on(DataRow));
        assert!(!machine.on(ValidMarker));
        assert!(!machine.on(DataRow));
        assert!(!machine.on(Header));
        assert!(machine.on(DataRow));
    }

    #[test]
    fn test_pending_first_then_header_then_valid() {
        let mut machine = SectionMachine::new();
        machine.on(PendingMarker);
        machine.on(Header);
        assert!(!machine.on(DataRow));
        machine.on(ValidMarker);
        assert_eq!(machine.state(), Active);
        assert!(machine.on(DataRow));
    }
}
