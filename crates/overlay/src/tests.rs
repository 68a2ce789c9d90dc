mod helpers;
mod open_tests;
