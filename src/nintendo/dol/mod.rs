pub mod memcard;
