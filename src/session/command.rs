// 该文件是 Kanzi （看字） 项目的一部分。
// src/session/command.rs - 交互命令解析
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use thiserror::Error;

pub const PROMPT: &str = "Commands: capture [OUTPUT] | view_detect [-i INPUT] [OUTPUT] | \
                          view_recognize [INPUT] | view | quit\n> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Capture {
    output: Option<PathBuf>,
  },
  Detect {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
  },
  Recognize {
    input: Option<PathBuf>,
  },
  Resume,
  Quit,
}

/// 命令通道上的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
  /// 操作员输入的一行
  Line(String),
  /// 输入结束或收到中断信号
  Interrupt,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
  #[error("unknown command '{0}'")]
  Unknown(String),
  #[error("{0}")]
  Invalid(String),
}

impl From<clap::Error> for CommandError {
  fn from(err: clap::Error) -> Self {
    // 只保留首行，去掉 usage 提示
    let rendered = err.render().to_string();
    let first = rendered.lines().next().unwrap_or_default();
    CommandError::Invalid(first.trim_start_matches("error: ").trim().to_string())
  }
}

/// 交互命令语法，每行的第一个词即子命令名
#[derive(Parser, Debug)]
#[command(multicall = true, disable_help_subcommand = true)]
struct Repl {
  #[command(subcommand)]
  verb: Verb,
}

#[derive(Subcommand, Debug)]
enum Verb {
  /// 保存当前画面
  #[command(name = "capture", disable_help_flag = true)]
  Capture {
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,
  },
  /// 文本检测，结果写入 XML
  #[command(name = "view_detect", alias = "detect", disable_help_flag = true)]
  Detect {
    #[arg(short, long, value_name = "INPUT")]
    input: Option<PathBuf>,
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,
  },
  /// 文字识别
  #[command(name = "view_recognize", alias = "recognize", disable_help_flag = true)]
  Recognize {
    #[arg(short, long, value_name = "INPUT")]
    input: Option<PathBuf>,
    #[arg(value_name = "INPUT", conflicts_with = "input")]
    path: Option<PathBuf>,
  },
  /// 恢复实时画面
  #[command(name = "view", alias = "resume", disable_help_flag = true)]
  Resume,
  /// 结束会话
  #[command(name = "quit", alias = "exit", disable_help_flag = true)]
  Quit,
}

impl From<Verb> for Command {
  fn from(verb: Verb) -> Self {
    match verb {
      Verb::Capture { output } => Command::Capture { output },
      Verb::Detect { input, output } => Command::Detect { input, output },
      Verb::Recognize { input, path } => Command::Recognize {
        input: input.or(path),
      },
      Verb::Resume => Command::Resume,
      Verb::Quit => Command::Quit,
    }
  }
}

impl Command {
  /// 解析一行输入，空行返回 `None`；命令名不区分大小写，参数保持原样
  pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
      return Ok(None);
    };

    let verb = verb.to_lowercase();
    if Repl::command().find_subcommand(&verb).is_none() {
      return Err(CommandError::Unknown(verb));
    }

    let repl = Repl::try_parse_from(std::iter::once(verb.as_str()).chain(tokens))?;
    Ok(Some(repl.verb.into()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(line: &str) -> Command {
    Command::parse(line).unwrap().unwrap()
  }

  fn invalid(line: &str) -> String {
    match Command::parse(line) {
      Err(CommandError::Invalid(message)) => message,
      other => panic!("expected invalid for {:?}, got {:?}", line, other),
    }
  }

  #[test]
  fn grammar_is_valid() {
    Repl::command().debug_assert();
  }

  #[test]
  fn empty_line_is_none() {
    assert_eq!(Command::parse(""), Ok(None));
    assert_eq!(Command::parse("   \t "), Ok(None));
  }

  #[test]
  fn verbs_and_aliases() {
    assert_eq!(parse("capture"), Command::Capture { output: None });
    assert_eq!(parse("VIEW"), Command::Resume);
    assert_eq!(parse("resume"), Command::Resume);
    assert_eq!(parse("Quit"), Command::Quit);
    assert_eq!(parse("exit"), Command::Quit);
    assert_eq!(parse("recognize"), Command::Recognize { input: None });
    assert_eq!(
      parse("detect"),
      Command::Detect {
        input: None,
        output: None
      }
    );
  }

  #[test]
  fn arguments_keep_case() {
    assert_eq!(
      parse("Capture Shots/A.JPG"),
      Command::Capture {
        output: Some(PathBuf::from("Shots/A.JPG"))
      }
    );
    assert_eq!(
      parse("view_detect -i In.png Out.xml"),
      Command::Detect {
        input: Some(PathBuf::from("In.png")),
        output: Some(PathBuf::from("Out.xml"))
      }
    );
    assert_eq!(
      parse("view_detect Out.xml --input In.png"),
      Command::Detect {
        input: Some(PathBuf::from("In.png")),
        output: Some(PathBuf::from("Out.xml"))
      }
    );
    assert_eq!(
      parse("VIEW_RECOGNIZE -i page.jpg"),
      Command::Recognize {
        input: Some(PathBuf::from("page.jpg"))
      }
    );
  }

  #[test]
  fn recognize_takes_positional_input() {
    assert_eq!(
      parse("view_recognize Page.jpg"),
      Command::Recognize {
        input: Some(PathBuf::from("Page.jpg"))
      }
    );
    assert_eq!(
      parse("recognize scans/b.png"),
      Command::Recognize {
        input: Some(PathBuf::from("scans/b.png"))
      }
    );
    invalid("view_recognize -i a.png b.png");
  }

  #[test]
  fn parse_failures() {
    assert_eq!(
      Command::parse("zoom in"),
      Err(CommandError::Unknown("zoom".to_string()))
    );
    assert_eq!(
      Command::parse("help"),
      Err(CommandError::Unknown("help".to_string()))
    );
    assert!(invalid("view_detect -i").contains("--input"));
    assert!(invalid("capture -i a.png").contains("-i"));
    assert!(invalid("capture a.jpg b.jpg").contains("b.jpg"));
    assert!(invalid("quit now").contains("now"));
  }
}
