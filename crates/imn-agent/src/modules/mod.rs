//! Built-in measurement modules.

mod probe;
pub use probe::ProbeStats;

mod ping;
pub use ping::PingModule;

mod tcping;
pub use tcping::TcpingModule;

mod echo;
pub use echo::EchoModule;

mod faulty;
pub use faulty::FaultyModule;
