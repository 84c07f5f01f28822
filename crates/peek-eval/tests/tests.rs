// Integration-test harness for peek-eval.
//
// Every suite module compiles into this single test binary.

mod suite;
