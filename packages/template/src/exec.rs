//! Walks the template tree against a data value.

use serde_json::Value;

use crate::funcs::Funcs;
use crate::lex::line_of;
use crate::parse::{Branch, Command, Node, Operand, Pipeline};
use crate::{value, Error};

pub(crate) struct Exec<'a> {
    name: &'a str,
    src: &'a str,
    funcs: &'a Funcs,
    /// Innermost last. `$` is always the first entry.
    vars: Vec<(String, Value)>,
    out: String,
}

impl<'a> Exec<'a> {
    pub fn new(name: &'a str, src: &'a str, funcs: &'a Funcs, root: Value) -> Self {
        Self {
            name,
            src,
            funcs,
            vars: vec![("$".to_string(), root)],
            out: String::new(),
        }
    }

    pub fn run(mut self, nodes: &[Node]) -> Result<String, Error> {
        let dot = self.vars[0].1.clone();
        self.walk(&dot, nodes)?;
        Ok(self.out)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::exec(self.name, line_of(self.src, offset), message)
    }

    fn walk(&mut self, dot: &Value, nodes: &[Node]) -> Result<(), Error> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let result = self.pipeline(dot, pipe)?;
                    if pipe.decl.is_empty() {
                        self.out.push_str(&value::display(&result));
                    }
                }
                Node::If(branch) => {
                    let mark = self.vars.len();
                    let cond = self.pipeline(dot, &branch.pipe)?;
                    if value::truthy(&cond) {
                        self.walk(dot, &branch.body)?;
                    } else {
                        self.walk(dot, &branch.otherwise)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::With(branch) => {
                    let mark = self.vars.len();
                    let cond = self.pipeline(dot, &branch.pipe)?;
                    if value::truthy(&cond) {
                        self.walk(&cond, &branch.body)?;
                    } else {
                        self.walk(dot, &branch.otherwise)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::Range(branch) => self.range(dot, branch)?,
            }
        }
        Ok(())
    }

    fn range(&mut self, dot: &Value, branch: &Branch) -> Result<(), Error> {
        let offset = branch.pipe.offset;
        let entries: Vec<(Value, Value)> = match self.commands(dot, &branch.pipe)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(self.error(
                    offset,
                    format!("range can't iterate over {}", value::display(&other)),
                ))
            }
        };

        if entries.is_empty() {
            return self.walk(dot, &branch.otherwise);
        }

        for (key, elem) in entries {
            let mark = self.vars.len();
            match branch.pipe.decl.as_slice() {
                [] => {}
                [v] => self.vars.push((v.clone(), elem.clone())),
                [k, v, ..] => {
                    self.vars.push((k.clone(), key));
                    self.vars.push((v.clone(), elem.clone()));
                }
            }
            self.walk(&elem, &branch.body)?;
            self.vars.truncate(mark);
        }

        Ok(())
    }

    /// Evaluate a pipeline and bind its declaration, if any.
    fn pipeline(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, Error> {
        let result = self.commands(dot, pipe)?;
        if let Some(name) = pipe.decl.first() {
            self.vars.push((name.clone(), result.clone()));
        }
        Ok(result)
    }

    fn commands(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, Error> {
        let mut piped = None;
        for cmd in &pipe.cmds {
            piped = Some(self.command(dot, cmd, piped, pipe.offset)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    /// The previous command's result, if any, becomes the last argument.
    fn command(
        &mut self,
        dot: &Value,
        cmd: &Command,
        piped: Option<Value>,
        offset: usize,
    ) -> Result<Value, Error> {
        let Some((first, rest)) = cmd.args.split_first() else {
            return Err(self.error(offset, "empty command"));
        };

        if let Operand::Function(name) = first {
            let mut args = Vec::with_capacity(rest.len() + 1);
            for operand in rest {
                args.push(self.operand(dot, operand, offset)?);
            }
            args.extend(piped);
            return self.call(name, &args, offset);
        }

        if !rest.is_empty() || piped.is_some() {
            return Err(self.error(offset, "can't give argument to non-function"));
        }
        self.operand(dot, first, offset)
    }

    fn operand(&mut self, dot: &Value, operand: &Operand, offset: usize) -> Result<Value, Error> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(chain) => self.fields(dot, chain, offset),
            Operand::Variable(name, chain) => {
                let base = self.variable(name, offset)?;
                self.fields(&base, chain, offset)
            }
            Operand::Function(name) => self.call(name, &[], offset),
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Nested(pipe) => self.pipeline(dot, pipe),
        }
    }

    fn variable(&self, name: &str, offset: usize) -> Result<Value, Error> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| self.error(offset, format!("undefined variable: {}", name)))
    }

    fn fields(&self, base: &Value, chain: &[String], offset: usize) -> Result<Value, Error> {
        let mut current = base;
        for name in chain {
            current = match current {
                Value::Object(map) => map.get(name).ok_or_else(|| {
                    self.error(offset, format!("map has no entry for key {:?}", name))
                })?,
                Value::Null => {
                    return Err(self.error(offset, format!("nil data; no entry for key {:?}", name)))
                }
                other => {
                    return Err(self.error(
                        offset,
                        format!("can't evaluate field {} in type {}", name, value::kind(other)),
                    ))
                }
            };
        }
        Ok(current.clone())
    }

    fn call(&self, name: &str, args: &[Value], offset: usize) -> Result<Value, Error> {
        let helper = self
            .funcs
            .get(name)
            .ok_or_else(|| self.error(offset, format!("function {:?} not defined", name)))?;
        helper(args).map_err(|message| self.error(offset, format!("error calling {}: {}", name, message)))
    }
}
