//! Evaluator over the shared environment.
//!
//! All blocks of a document evaluate against one environment, in document
//! order: later blocks see the bindings earlier blocks established.

use rustc_hash::FxHashMap;

use crate::error::{EvalError, EvalResult};
use crate::parser::{BinOp, Expr, Program, Stmt};
use crate::value::Value;

/// Callback receiving `print` output.
pub type PrintSink<'a> = dyn Fn(String) + 'a;

/// Evaluate a program against `env`. The block's value is the value of its
/// last expression statement, `null` otherwise.
pub fn eval_program(
    program: &Program,
    env: &mut FxHashMap<String, Value>,
    print: &PrintSink<'_>,
) -> EvalResult<Value> {
    let mut last = Value::Null;
    for stmt in &program.stmts {
        match stmt {
            Stmt::Assign { name, expr } => {
                let value = eval_expr(expr, env, print)?;
                env.insert(name.clone(), value);
            }
            Stmt::Throw(expr) => {
                let value = eval_expr(expr, env, print)?;
                return Err(EvalError::Thrown(value.render()));
            }
            Stmt::Expr(expr) => {
                last = eval_expr(expr, env, print)?;
            }
        }
    }
    Ok(last)
}

fn eval_expr(
    expr: &Expr,
    env: &mut FxHashMap<String, Value>,
    print: &PrintSink<'_>,
) -> EvalResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, env, print)?);
            }
            Ok(Value::Array(values))
        }
        Expr::Neg(inner) => match eval_expr(inner, env, print)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::Type(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_expr(lhs, env, print)?;
            let rhs = eval_expr(rhs, env, print)?;
            eval_binary(*op, lhs, rhs)
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, env, print)?);
            }
            call_builtin(name, values, print)
        }
    }
}

fn eval_binary(op: BinOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    match op {
        BinOp::Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            // either side a string: concatenate
            (Value::Str(a), b) => Ok(Value::Str(format!("{a}{}", b.render()))),
            (a, Value::Str(b)) => Ok(Value::Str(format!("{}{b}", a.render()))),
            (a, b) => Err(type_error("+", &a, &b)),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let (a, b) = match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => (a, b),
                (a, b) => return Err(type_error(op_symbol(op), &a, &b)),
            };
            match op {
                BinOp::Sub => Ok(Value::Number(a - b)),
                BinOp::Mul => Ok(Value::Number(a * b)),
                BinOp::Div if b == 0.0 => Err(EvalError::DivisionByZero),
                BinOp::Div => Ok(Value::Number(a / b)),
                BinOp::Rem if b == 0.0 => Err(EvalError::DivisionByZero),
                BinOp::Rem => Ok(Value::Number(a % b)),
                _ => Err(EvalError::Type("unreachable arithmetic".to_string())),
            }
        }
        BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinOp::NotEq => Ok(Value::Bool(lhs != rhs)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let (a, b) = match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                _ => return Err(type_error(op_symbol(op), &lhs, &rhs)),
            };
            Ok(Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Gt => a > b,
                BinOp::Le => a <= b,
                _ => a >= b,
            }))
        }
    }
}

fn call_builtin(name: &str, args: Vec<Value>, print: &PrintSink<'_>) -> EvalResult<Value> {
    match name {
        "print" => {
            let line: Vec<String> = args.iter().map(Value::render).collect();
            print(line.join(" "));
            Ok(Value::Null)
        }
        "len" => match args.as_slice() {
            [Value::Str(s)] => Ok(Value::Number(s.chars().count() as f64)),
            [Value::Array(items)] => Ok(Value::Number(items.len() as f64)),
            [other] => Err(EvalError::Type(format!(
                "len expects a string or array, got {}",
                other.type_name()
            ))),
            _ => Err(EvalError::Type("len expects one argument".to_string())),
        },
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Eq => "==",
        BinOp::NotEq => "!=",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
    }
}

fn type_error(op: &str, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::Type(format!(
        "cannot apply `{op}` to {} and {}",
        lhs.type_name(),
        rhs.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn run(source: &str, env: &mut FxHashMap<String, Value>) -> EvalResult<Value> {
        eval_program(&parse_program(source)?, env, &|_| {})
    }

    #[test]
    fn test_arithmetic() {
        let mut env = FxHashMap::default();
        assert_eq!(run("1+1", &mut env), Ok(Value::Number(2.0)));
        assert_eq!(run("2 + 3 * 4", &mut env), Ok(Value::Number(14.0)));
        assert_eq!(run("-(2 + 1)", &mut env), Ok(Value::Number(-3.0)));
    }

    #[test]
    fn test_bindings_persist_across_blocks() {
        let mut env = FxHashMap::default();
        run("x = 21", &mut env).unwrap();
        assert_eq!(run("x * 2", &mut env), Ok(Value::Number(42.0)));
    }

    #[test]
    fn test_unknown_variable() {
        let mut env = FxHashMap::default();
        assert_eq!(
            run("q + 1", &mut env),
            Err(EvalError::UnknownVariable("q".to_string()))
        );
    }

    #[test]
    fn test_throw() {
        let mut env = FxHashMap::default();
        assert_eq!(
            run("throw 'x'", &mut env),
            Err(EvalError::Thrown("x".to_string()))
        );
    }

    #[test]
    fn test_division_by_zero() {
        let mut env = FxHashMap::default();
        assert_eq!(run("1 / 0", &mut env), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_print_reaches_sink() {
        let mut env = FxHashMap::default();
        let lines = std::cell::RefCell::new(Vec::new());
        let program = parse_program("print('a', 1)\n2").unwrap();
        let value = eval_program(&program, &mut env, &|line| lines.borrow_mut().push(line));
        assert_eq!(value, Ok(Value::Number(2.0)));
        assert_eq!(lines.borrow().as_slice(), ["a 1"]);
    }

    #[test]
    fn test_string_concat_and_comparison() {
        let mut env = FxHashMap::default();
        assert_eq!(
            run("'a' + 1", &mut env),
            Ok(Value::Str("a1".to_string()))
        );
        assert_eq!(run("2 <= 2", &mut env), Ok(Value::Bool(true)));
        assert_eq!(run("[1] == [1]", &mut env), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_len_builtin() {
        let mut env = FxHashMap::default();
        assert_eq!(run("len([1,2,3])", &mut env), Ok(Value::Number(3.0)));
        assert_eq!(run("len('ab')", &mut env), Ok(Value::Number(2.0)));
    }
}
