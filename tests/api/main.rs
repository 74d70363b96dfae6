mod helpers;
mod sdn_api;
mod vm_api;
