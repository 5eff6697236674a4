// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute expressions used by building symbols
//!
//! Numeric expressions are arithmetic over literals and attribute
//! references written `[name]`, for example `[levels] * 3.5 + 2`.
//! String expressions are text with `[name]` substitutions.
//! Missing attributes evaluate to `0` and the empty string respectively.

use crate::error::{Error, Result};
use crate::feature::Attributes;
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    multi::{fold_many0, many0},
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Attribute(String),
    Neg(Box<Node>),
    Binary(char, Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, attrs: &Attributes) -> f64 {
        match self {
            Node::Number(v) => *v,
            Node::Attribute(name) => attrs.get(name).and_then(|v| v.as_f64()).unwrap_or(0.0),
            Node::Neg(inner) => -inner.eval(attrs),
            Node::Binary(op, a, b) => {
                let (a, b) = (a.eval(attrs), b.eval(attrs));
                match op {
                    '+' => a + b,
                    '-' => a - b,
                    '*' => a * b,
                    _ => {
                        if b == 0.0 {
                            0.0
                        } else {
                            a / b
                        }
                    }
                }
            }
        }
    }
}

fn attribute_name(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_while1(|c: char| c != ']'), char(']'))(input)
}

fn factor(input: &str) -> IResult<&str, Node> {
    delimited(
        multispace0,
        alt((
            map(double, Node::Number),
            map(attribute_name, |name| Node::Attribute(name.trim().to_string())),
            delimited(char('('), expr, char(')')),
            map(preceded(char('-'), factor), |n| Node::Neg(Box::new(n))),
        )),
        multispace0,
    )(input)
}

fn term(input: &str) -> IResult<&str, Node> {
    let (input, first) = factor(input)?;
    fold_many0(
        pair(alt((char('*'), char('/'))), factor),
        move || first.clone(),
        |acc, (op, rhs)| Node::Binary(op, Box::new(acc), Box::new(rhs)),
    )(input)
}

fn expr(input: &str) -> IResult<&str, Node> {
    let (input, first) = term(input)?;
    fold_many0(
        pair(alt((char('+'), char('-'))), term),
        move || first.clone(),
        |acc, (op, rhs)| Node::Binary(op, Box::new(acc), Box::new(rhs)),
    )(input)
}

/// Arithmetic expression over feature attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NumericExpr {
    source: String,
    root: Node,
}

impl NumericExpr {
    pub fn parse(source: &str) -> Result<Self> {
        let (_, root) = all_consuming(expr)(source)
            .map_err(|_| Error::Expression(source.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Constant expression
    pub fn literal(value: f64) -> Self {
        Self {
            source: value.to_string(),
            root: Node::Number(value),
        }
    }

    pub fn eval(&self, attrs: &Attributes) -> f64 {
        self.root.eval(attrs)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl TryFrom<String> for NumericExpr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NumericExpr> for String {
    fn from(value: NumericExpr) -> Self {
        value.source
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Attribute(String),
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        map(attribute_name, |name| Segment::Attribute(name.trim().to_string())),
        map(take_while1(|c: char| c != '['), |s: &str| {
            Segment::Text(s.to_string())
        }),
        // A lone '[' without a closing bracket is literal text
        map(pair(char('['), take_while(|c: char| c != '[')), |(_, s): (char, &str)| {
            Segment::Text(format!("[{s}"))
        }),
    ))(input)
}

/// Text with `[attribute]` substitutions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StringExpr {
    source: String,
    segments: Vec<Segment>,
}

impl StringExpr {
    pub fn parse(source: &str) -> Result<Self> {
        let (_, segments) = all_consuming(many0(segment))(source)
            .map_err(|_| Error::Expression(source.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn eval(&self, attrs: &Attributes) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Attribute(name) => {
                    if let Some(value) = attrs.get(name) {
                        out.push_str(&value.as_string());
                    }
                }
            }
        }
        out
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl TryFrom<String> for StringExpr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<StringExpr> for String {
    fn from(value: StringExpr) -> Self {
        value.source
    }
}
