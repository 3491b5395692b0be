pub mod descriptor_write;
pub mod resource_bundle;
pub mod resource_bundle_group;
pub mod resource_bundle_layout;
