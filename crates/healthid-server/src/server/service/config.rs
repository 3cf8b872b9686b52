use healthid::{HidEngine, MemoryStore, StaticDirectory, SystemClock};

/// Clock stamping generated and used records.
pub type Clock = SystemClock;

/// Store backend behind the engine.
pub type Backend = MemoryStore;

/// Facility directory consulted before organization blocks are issued.
pub type Directory = StaticDirectory;

/// The engine shared by every worker and handler.
pub type Engine = HidEngine<Backend, Directory, Clock>;
