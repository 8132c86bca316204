//! Math 工具：安全的算术表达式求值（递归下降，不执行任何代码）
//!
//! 支持 `+ - * / // % **`（`^` 视为幂）、一元正负号、括号、列表字面量，
//! 以及函数 abs / min / max / round / sum。整除与取模按向下取整语义。

use async_trait::async_trait;

use crate::react::{ParamKind, ParamSpec, ToolArgs};
use crate::tools::Tool;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MathError {
    #[error("Division by zero is not allowed in mathematical expressions.")]
    DivisionByZero,

    #[error("Invalid mathematical expression: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Pow,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
enum Val {
    Num(f64),
    List(Vec<f64>),
}

fn tokenize(src: &str) -> Result<Vec<Token>, MathError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| MathError::Invalid(format!("bad number '{text}'")))?;
                tokens.push(Token::Num(n));
            }
            'a'..='z' | 'A'..='Z' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            _ => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' | '×' => Token::Star,
                    '/' | '÷' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Pow,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    other => {
                        return Err(MathError::Invalid(format!(
                            "Expression contains invalid character '{other}'"
                        )))
                    }
                });
                i += 1;
            }
        }
    }
    Ok(tokens)
}

/// 嵌套层数上限（括号、一元符号、幂指数都计入）
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn consume(&mut self, token: Token) -> Result<(), MathError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(MathError::Invalid(format!(
                "expected {token:?}, found {}",
                other.map_or("end of input".to_string(), |t| format!("{t:?}"))
            ))),
        }
    }

    fn expr(&mut self) -> Result<Val, MathError> {
        let mut left = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus | Token::Minus => {
                    self.pos += 1;
                    let right = num(self.term()?)?;
                    let l = num(left)?;
                    left = Val::Num(if op == Token::Plus { l + right } else { l - right });
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Val, MathError> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            if !matches!(op, Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent) {
                break;
            }
            self.pos += 1;
            let r = num(self.unary()?)?;
            let l = num(left)?;
            left = Val::Num(match op {
                Token::Star => l * r,
                _ if r == 0.0 => return Err(MathError::DivisionByZero),
                Token::Slash => l / r,
                Token::DoubleSlash => (l / r).floor(),
                _ => l - r * (l / r).floor(),
            });
        }
        Ok(left)
    }

    /// 所有递归路径都经过 unary，在此处统一限制深度
    fn unary(&mut self) -> Result<Val, MathError> {
        if self.depth >= MAX_DEPTH {
            return Err(MathError::Invalid("expression is nested too deeply".into()));
        }
        self.depth += 1;
        let result = self.unary_inner();
        self.depth -= 1;
        result
    }

    fn unary_inner(&mut self) -> Result<Val, MathError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Val::Num(-num(self.unary()?)?))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                Ok(Val::Num(num(self.unary()?)?))
            }
            _ => self.power(),
        }
    }

    /// 幂运算右结合，且优先级高于左侧一元负号：-2**2 == -4
    fn power(&mut self) -> Result<Val, MathError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exp = num(self.unary()?)?;
            let b = num(base)?;
            if b == 0.0 && exp < 0.0 {
                return Err(MathError::DivisionByZero);
            }
            let result = b.powf(exp);
            if result.is_nan() {
                return Err(MathError::Invalid("result is not a real number".into()));
            }
            return Ok(Val::Num(result));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Val, MathError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Val::Num(n)),
            Some(Token::LParen) => {
                let v = self.expr()?;
                self.consume(Token::RParen)?;
                Ok(v)
            }
            Some(Token::LBracket) => {
                let items = self.list_items(Token::RBracket)?;
                Ok(Val::List(items.into_iter().map(num).collect::<Result<_, _>>()?))
            }
            Some(Token::Ident(name)) => {
                self.consume(Token::LParen)?;
                let args = self.list_items(Token::RParen)?;
                call(&name, args)
            }
            Some(t) => Err(MathError::Invalid(format!("unexpected token {t:?}"))),
            None => Err(MathError::Invalid("unexpected end of expression".into())),
        }
    }

    fn list_items(&mut self, close: Token) -> Result<Vec<Val>, MathError> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) if self.peek() == Some(&close) => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(Token::Comma) => continue,
                Some(t) if t == close => return Ok(items),
                _ => return Err(MathError::Invalid("unbalanced brackets or parentheses".into())),
            }
        }
    }
}

fn num(v: Val) -> Result<f64, MathError> {
    match v {
        Val::Num(n) => Ok(n),
        Val::List(_) => Err(MathError::Invalid("a list cannot be used as a number".into())),
    }
}

/// 函数参数：单个列表参数展开为其元素
fn flatten(args: Vec<Val>) -> Result<Vec<f64>, MathError> {
    match args.as_slice() {
        [Val::List(items)] => Ok(items.clone()),
        _ => args.into_iter().map(num).collect(),
    }
}

fn call(name: &str, args: Vec<Val>) -> Result<Val, MathError> {
    let arity = |expected: &str| MathError::Invalid(format!("{name}() takes {expected}"));
    let n = match name {
        "abs" => match args.as_slice() {
            [Val::Num(x)] => x.abs(),
            _ => return Err(arity("exactly one number")),
        },
        "round" => match args.as_slice() {
            [Val::Num(x)] => x.round(),
            [Val::Num(x), Val::Num(d)] => {
                let factor = 10f64.powi(*d as i32);
                (x * factor).round() / factor
            }
            _ => return Err(arity("a number and optional digits")),
        },
        "min" | "max" | "sum" => {
            let values = flatten(args)?;
            match name {
                "sum" => values.iter().sum(),
                _ if values.is_empty() => return Err(arity("at least one value")),
                "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
                _ => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        }
        other => return Err(MathError::Invalid(format!("Unsupported function: {other}"))),
    };
    Ok(Val::Num(n))
}

/// 求值入口
pub fn evaluate(expression: &str) -> Result<f64, MathError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(MathError::Invalid("Expression must be a non-empty string".into()));
    }
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(MathError::Invalid(
            "unexpected trailing input (unbalanced parentheses?)".into(),
        ));
    }
    let n = num(value)?;
    if !n.is_finite() {
        return Err(MathError::Invalid("result is too large".into()));
    }
    Ok(n)
}

/// 整数结果不带小数；其余保留 10 位有效数字
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        return format!("{}", x as i64);
    }
    let exp = x.abs().log10().floor() as i32;
    if !(-4..10).contains(&exp) {
        let s = format!("{:.9e}", x);
        let (mantissa, e) = s.split_once('e').unwrap_or((s.as_str(), "0"));
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        let e: i32 = e.parse().unwrap_or(0);
        return format!("{mantissa}e{}{:02}", if e < 0 { '-' } else { '+' }, e.abs());
    }
    let decimals = (9 - exp).max(0) as usize;
    let s = format!("{:.*}", decimals, x);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression safely. Supports + - * / // % ** and parentheses, \
         plus abs, min, max, round, sum. Example input: 2 + 3 * 4"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "expression",
            ParamKind::Text,
            "the arithmetic expression to evaluate",
        )]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, String> {
        let expression = args.text("expression").unwrap_or_default();
        let expression = expression.trim();
        tracing::debug!(expression, "Calculating expression");
        match evaluate(expression) {
            Ok(value) => {
                let formatted = format_number(value);
                Ok(format!(
                    "The calculation result is {formatted}, as {expression} = {formatted}."
                ))
            }
            Err(e) => {
                tracing::warn!(expression, error = %e, "Calculation failed");
                Err(e.to_string())
            }
        }
    }
}

pub struct MathHelpTool;

const MATH_HELP: &str = "Mathematical Calculator Help

SUPPORTED OPERATIONS:
- Basic arithmetic: +, -, *, /, // (floor division), % (modulo), ** (power)
- Parentheses for grouping: ( )

AVAILABLE FUNCTIONS:
- abs(x): absolute value
- min(a, b, ...) / max(a, b, ...): minimum / maximum
- round(x, digits): round to the given number of decimal places
- sum([a, b, c]): sum of a list of numbers

EXAMPLES:
- 2 + 3 * 4 -> 14
- (10 - 5) * 2 -> 10
- round(3.14159, 2) -> 3.14
- sum([1, 2, 3, 4, 5]) -> 15

LIMITATIONS: no variables, loops or conditionals; numbers only.";

#[async_trait]
impl Tool for MathHelpTool {
    fn name(&self) -> &str {
        "math_help"
    }

    fn description(&self) -> &str {
        "Show supported operations, functions and examples for the calculator. Takes no input."
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<String, String> {
        Ok(MATH_HELP.to_string())
    }
}
