//! Bounded filter expressions over a reference table.
//!
//! Grammar: `clause (and clause)*` where `clause := column op value`,
//! `op` is one of `==`, `!=`, `contains`. Columns containing spaces are
//! wrapped in backticks, values may be bare or quoted with `'` or `"`.
//! Comparisons ignore ASCII case.

use super::parser::Table;

pub(crate) const MAX_ROWS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    NotEquals,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    column: String,
    operator: Operator,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Column(String),
    Op(Operator),
}

pub(crate) fn filter(table: &Table, expression: &str) -> Result<Vec<Vec<String>>, String> {
    let clauses = parse(expression)?;

    let mut indexed = Vec::with_capacity(clauses.len());
    for clause in &clauses {
        let index = table
            .column_index(&clause.column)
            .ok_or_else(|| format!("unknown column '{}'", clause.column))?;
        indexed.push((index, clause));
    }

    Ok(table
        .rows
        .iter()
        .filter(|row| {
            indexed.iter().all(|(index, clause)| {
                let cell = row.get(*index).map(String::as_str).unwrap_or_default();
                matches(cell, clause)
            })
        })
        .take(MAX_ROWS)
        .cloned()
        .collect())
}

fn matches(cell: &str, clause: &Clause) -> bool {
    let cell = cell.to_ascii_lowercase();
    let value = clause.value.to_ascii_lowercase();
    match clause.operator {
        Operator::Equals => cell == value,
        Operator::NotEquals => cell != value,
        Operator::Contains => cell.contains(&value),
    }
}

fn parse(expression: &str) -> Result<Vec<Clause>, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty query".to_string());
    }

    let mut clauses = Vec::new();
    let mut position = 0;
    loop {
        let column = match tokens.get(position) {
            Some(Token::Word(word)) | Some(Token::Column(word)) => word.clone(),
            Some(other) => return Err(format!("expected column name, found {other:?}")),
            None => return Err("expected column name at end of query".to_string()),
        };
        let operator = match tokens.get(position + 1) {
            Some(Token::Op(operator)) => *operator,
            _ => return Err(format!("expected operator after '{column}'")),
        };
        let value = match tokens.get(position + 2) {
            Some(Token::Word(word)) | Some(Token::Quoted(word)) => word.clone(),
            _ => return Err(format!("expected value after operator for '{column}'")),
        };
        clauses.push(Clause {
            column,
            operator,
            value,
        });
        position += 3;

        match tokens.get(position) {
            None => break,
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("and") => position += 1,
            Some(other) => return Err(format!("expected 'and' between clauses, found {other:?}")),
        }
    }

    Ok(clauses)
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&current) = chars.peek() {
        if current.is_whitespace() {
            chars.next();
            continue;
        }

        match current {
            '\'' | '"' | '`' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == current {
                        closed = true;
                        break;
                    }
                    literal.push(next);
                }
                if !closed {
                    return Err(format!("unterminated {current} quote"));
                }
                tokens.push(if current == '`' {
                    Token::Column(literal)
                } else {
                    Token::Quoted(literal)
                });
            }
            '=' | '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(format!("unsupported operator starting with '{current}'"));
                }
                tokens.push(Token::Op(if current == '=' {
                    Operator::Equals
                } else {
                    Operator::NotEquals
                }));
            }
            _ => {
                let mut word = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '\'' | '"' | '`' | '=' | '!') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                if word.eq_ignore_ascii_case("contains") {
                    tokens.push(Token::Op(Operator::Contains));
                } else {
                    tokens.push(Token::Word(word));
                }
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lectures() -> Table {
        Table {
            columns: vec![
                "course_id".to_string(),
                "day".to_string(),
                "slot".to_string(),
                "Course Level".to_string(),
            ],
            rows: vec![
                vec!["CS101".into(), "Mon".into(), "1".into(), "Bachelor".into()],
                vec!["CS102".into(), "Mon".into(), "2".into(), "Bachelor".into()],
                vec!["MA201".into(), "Tue".into(), "1".into(), "Master".into()],
            ],
        }
    }

    #[test]
    fn equality_is_case_insensitive() {
        let rows = filter(&lectures(), "course_id == 'cs101'").expect("query runs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "CS101");
    }

    #[test]
    fn clauses_combine_with_and() {
        let rows = filter(&lectures(), "day == Mon and slot != \"1\"").expect("query runs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "CS102");
    }

    #[test]
    fn backticks_address_columns_with_spaces() {
        let rows = filter(&lectures(), "`Course Level` contains mast").expect("query runs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "MA201");
    }

    #[test]
    fn malformed_queries_report_reason() {
        assert!(filter(&lectures(), "").is_err());
        assert!(filter(&lectures(), "course_id = CS101").is_err());
        assert!(filter(&lectures(), "course_id == 'CS101").is_err());
        assert!(filter(&lectures(), "room == 12").unwrap_err().contains("unknown column"));
        assert!(filter(&lectures(), "day == Mon or day == Tue").is_err());
    }
}
