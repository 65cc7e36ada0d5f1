mod cache_invariants;
mod engine;
mod motor_timeout;
mod scenarios;
mod track_change_write_back;
