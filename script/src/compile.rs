//! Script text → instruction list.

use crate::ScriptError;

/// One compiled statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    New {
        token: String,
        total: u64,
        precision: u64,
    },
    Mint {
        token: String,
        amount: u64,
    },
    Transfer {
        token: String,
        amount: u64,
        to: String,
    },
    Freeze {
        token: String,
        holder: String,
    },
    Unfreeze {
        token: String,
        holder: String,
    },
}

impl Instruction {
    pub fn opcode(&self) -> &'static str {
        match self {
            Instruction::New { .. } => "new",
            Instruction::Mint { .. } => "mint",
            Instruction::Transfer { .. } => "transfer",
            Instruction::Freeze { .. } => "freeze",
            Instruction::Unfreeze { .. } => "unfreeze",
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Instruction::New { token, .. }
            | Instruction::Mint { token, .. }
            | Instruction::Transfer { token, .. }
            | Instruction::Freeze { token, .. }
            | Instruction::Unfreeze { token, .. } => token,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

/// Compile a script into instructions. An empty script is an error.
pub fn compile(text: &str) -> Result<Vec<Instruction>, ScriptError> {
    let statements = lex(text)?;
    if statements.is_empty() {
        return Err(ScriptError::Empty);
    }
    statements
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| parse_statement(i, stmt))
        .collect()
}

fn lex(text: &str) -> Result<Vec<Vec<Token>>, ScriptError> {
    let mut statements = Vec::new();
    let mut current = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ';' | '\n' => {
                chars.next();
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(ScriptError::Parse {
                                statement: statements.len(),
                                reason: "unterminated string".into(),
                            })
                        }
                    }
                }
                current.push(Token::Quoted(s));
            }
            _ => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == ';' || ch == '"' {
                        break;
                    }
                    s.push(ch);
                    chars.next();
                }
                current.push(Token::Word(s));
            }
        }
    }
    if !current.is_empty() {
        statements.push(current);
    }
    Ok(statements)
}

fn parse_statement(index: usize, tokens: Vec<Token>) -> Result<Instruction, ScriptError> {
    let mut iter = tokens.into_iter();
    let op = match iter.next() {
        Some(Token::Word(w)) => w,
        _ => {
            return Err(ScriptError::Parse {
                statement: index,
                reason: "statement must start with an opcode".into(),
            })
        }
    };
    let args: Vec<Token> = iter.collect();

    match op.as_str() {
        "new" => {
            arity("new", &args, 3)?;
            Ok(Instruction::New {
                token: string_arg("new", &args, 0)?,
                total: number_arg("new", &args, 1)?,
                precision: number_arg("new", &args, 2)?,
            })
        }
        "mint" => {
            arity("mint", &args, 2)?;
            Ok(Instruction::Mint {
                token: string_arg("mint", &args, 0)?,
                amount: number_arg("mint", &args, 1)?,
            })
        }
        "transfer" => {
            arity("transfer", &args, 3)?;
            Ok(Instruction::Transfer {
                token: string_arg("transfer", &args, 0)?,
                amount: number_arg("transfer", &args, 1)?,
                to: string_arg("transfer", &args, 2)?,
            })
        }
        "freeze" => {
            arity("freeze", &args, 2)?;
            Ok(Instruction::Freeze {
                token: string_arg("freeze", &args, 0)?,
                holder: string_arg("freeze", &args, 1)?,
            })
        }
        "unfreeze" => {
            arity("unfreeze", &args, 2)?;
            Ok(Instruction::Unfreeze {
                token: string_arg("unfreeze", &args, 0)?,
                holder: string_arg("unfreeze", &args, 1)?,
            })
        }
        other => Err(ScriptError::UnknownOpcode(other.to_string())),
    }
}

fn arity(op: &'static str, args: &[Token], expected: usize) -> Result<(), ScriptError> {
    if args.len() != expected {
        return Err(ScriptError::Arity {
            op,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn string_arg(op: &'static str, args: &[Token], index: usize) -> Result<String, ScriptError> {
    match &args[index] {
        Token::Quoted(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ScriptError::ArgType {
            op,
            index,
            expected: "non-empty quoted string",
        }),
    }
}

fn number_arg(op: &'static str, args: &[Token], index: usize) -> Result<u64, ScriptError> {
    match &args[index] {
        Token::Word(w) => w.parse().map_err(|_| ScriptError::ArgType {
            op,
            index,
            expected: "u64 number",
        }),
        Token::Quoted(_) => Err(ScriptError::ArgType {
            op,
            index,
            expected: "u64 number",
        }),
    }
}
