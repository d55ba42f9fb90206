/// Built-in acoustic-model backend (§6.1).
pub mod whisper;
