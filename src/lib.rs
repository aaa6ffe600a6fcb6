//! Curates single-copy marker-gene sequences across genomes for phylogenetics.
//!
//! Stages: resolve genome requests against an assembly summary ([`catalog`]),
//! materialize protein/nucleotide files ([`acquire`]), assign proteins to panel
//! markers ([`classify`]), pull out winning records ([`extract`]), merge them per
//! marker ([`aggregate`]) and describe the result for tree building ([`manifest`]).

pub mod acquire;
pub mod aggregate;
pub mod app;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fasta;
pub mod fs_util;
pub mod manifest;
pub mod ncbi;
pub mod output;
pub mod scorer;
pub mod store;
