// ─── PatchSync Core ───
// Modular backend architecture for a multi-install game launcher.
//
// Architecture:
//   core/
//     checksum/   — CRC32 drift detection for local files
//     manifest/   — Remote manifest model + diff engine
//     patcher/    — Atomic patch application with .tmp staging
//     mods/       — Optional mod catalog + version reconciliation
//     install/    — Installation model + configuration seam
//     remote/     — Remote file store seam + HTTP implementation
//     process/    — Multi-instance launching + exit reaping
//     service/    — Orchestrating patch/validate/launch service

pub mod checksum;
pub mod error;
pub mod http;
pub mod install;
pub mod manifest;
pub mod mods;
pub mod patcher;
pub mod process;
pub mod remote;
pub mod service;
