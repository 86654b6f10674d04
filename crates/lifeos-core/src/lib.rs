pub mod bus;
pub mod errors;
pub mod events;
pub mod json;
pub mod module;
pub mod surface;

pub use bus::{EventBus, EventSummary, ListenerId, Subscription};
pub use errors::ModuleError;
pub use module::{Capabilities, Module, ModuleContext};
pub use surface::PageSurface;
