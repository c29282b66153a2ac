//! Feature modules, each following the hexagonal layout:
//! `domain/` (pure types), `infrastructure/` (algorithms over them),
//! `ports/` (trait boundaries to external collaborators).

pub mod coloring;
pub mod graph_builder;
pub mod painting_session;
