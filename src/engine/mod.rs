mod external;
mod handler;

pub use handler::MesosHandler;
