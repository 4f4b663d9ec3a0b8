mod application_test;
mod common;
mod engines_test;
