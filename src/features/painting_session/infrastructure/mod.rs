mod session;

pub use session::PaintingSession;
