pub mod backups;
pub mod bundle;
pub mod cloud;
pub mod collections;
pub mod pod_meta;
pub mod shared_config;
pub mod workspace;
