//! Config repository model: modules, machine profiles, package manifests,
//! the package catalog, and user settings.
pub mod catalog;
pub mod discovery;
pub mod machine;
pub mod module;
pub mod packages;
pub mod settings;
pub mod toml_loader;

pub use catalog::{CatalogEntry, InstallDefinition, PackageCatalog, TomlPackageCatalog};
pub use discovery::{DiscoveryResult, ModuleCatalog, TomlModuleCatalog};
pub use machine::{MachineProfile, MachineProfileSource, TomlMachineProfileSource};
pub use module::{LinkEntry, LinkKind, LinkTarget, Module, RegistryEntry, RegistryValue};
pub use packages::{InstallManifest, PackageDefinition, PackageManager};
pub use settings::Settings;
