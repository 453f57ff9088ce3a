mod retrieval_tests;
mod support;
