// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod analysis;
pub mod budget;
pub mod cli;
pub mod commands;
pub mod db;
pub mod error;
pub mod export;
pub mod live;
pub mod models;
pub mod repository;
pub mod schema;
pub mod settings;
pub mod utils;
