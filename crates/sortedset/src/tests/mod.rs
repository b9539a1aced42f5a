mod codec_tests;
mod helpers;
mod persisted_tests;
