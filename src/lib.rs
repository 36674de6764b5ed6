//! mcts-2048: a 2048 game engine + Monte Carlo Tree Search policy
//!
//! This crate provides:
//! - A compact `Board` type with ergonomic methods (`shift`, `make_move`, `legal_moves`, ...)
//!   and the `GameEngine` trait the search plays through
//! - An MCTS move recommender (`mcts` module) with single-threaded and parallel variants
//! - TOML/env configuration loading (`config` module)
//!
//! Quick start:
//! ```
//! use mcts_2048::engine::{self as GameEngine, Board, Move};
//! use mcts_2048::mcts::recommend_move;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // One-time table init
//! GameEngine::new();
//!
//! // Deterministic board initialization with a seeded RNG
//! let mut rng = StdRng::seed_from_u64(42);
//! let b0 = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
//! let (b1, reward) = b0.shift_with_reward(Move::Left);
//! assert!(reward % 4 == 0 && b1.count_empty() >= 14);
//!
//! let mv = recommend_move(b0, 100, 50.0, 7).unwrap();
//! assert!(mv.is_some());
//! ```
pub mod config;
pub mod engine;
pub mod mcts;
