//! Stateless repositories — every method takes a borrowed `&Connection`.

pub mod log;
pub mod room;
pub mod session;

pub use log::LogRepo;
pub use room::RoomRepo;
pub use session::SessionRepo;
