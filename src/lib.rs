pub mod nintendo;
