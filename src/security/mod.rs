pub mod idps;
