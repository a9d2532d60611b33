pub mod tabs;

pub use tabs::TabStore;
