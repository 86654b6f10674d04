//! Module lifecycle, lazy loading, tab routing and application bootstrap.

pub mod app;
pub mod error;
pub mod layout;
pub mod loader;
pub mod manager;
pub mod router;
pub mod surface;

pub use app::{App, AppReport, HealthReport, ModuleHealth};
pub use error::AppError;
pub use layout::{ModuleLayout, TabLayout};
pub use loader::{
    default_load_table, FactoryResolver, LazyLoader, LoadSpec, ModuleFactory, ModuleResolver,
    Priority,
};
pub use manager::{InitOutcome, ModuleManager, ModuleState, ModuleSummary};
pub use router::{Key, KeyInput, Navigation, Router, RouterDeps};
pub use surface::HeadlessSurface;
