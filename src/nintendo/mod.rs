pub mod dol;
