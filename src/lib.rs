//! stepchain
//!
//! ステップ列を1つずつ順番に実行するワークフローエンジンです。
//! 各ステップは次に実行するステップを変更でき（ジャンプ、繰り返し、早期終了）、
//! 同期ステップと非同期ステップを混在させながら、値と永続状態を受け渡します。
//!
//! # モジュール構成
//!
//! - [`engine`][]: ワークフロー実行エンジン
//! - [`config`][]: TOML によるワークフロー定義
//! - [`error`][]: エラー型
//! - [`logging`][]: ロガーの初期化

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
