//! Call string parser
//!
//! Static calls look like `Ns.Path.Class.Method(a, b)`, instance calls like
//! `Method(a, b)`. The first `(` and the last `)` delimit the argument list;
//! anything after the closing parenthesis is ignored.

use crate::error::{BridgeError, BridgeResult};

/// A parsed static call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Namespace segments joined with `.`
    pub namespace: String,
    pub class: String,
    pub method: String,
    /// Argument literals, trimmed, empty entries dropped
    pub args: Vec<String>,
}

impl CallRecord {
    /// Fully qualified type name, `Namespace.Class`
    pub fn type_path(&self) -> String {
        format!("{}.{}", self.namespace, self.class)
    }

    /// Fully qualified member path, `Namespace.Class.Method`
    pub fn member_path(&self) -> String {
        format!("{}.{}.{}", self.namespace, self.class, self.method)
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// A parsed instance call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceCall {
    pub method: String,
    pub args: Vec<String>,
}

impl InstanceCall {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

fn malformed(call: &str, reason: &'static str) -> BridgeError {
    BridgeError::MalformedCall {
        call: call.to_string(),
        reason,
    }
}

/// Split a call into its trimmed name and argument literals.
fn split_call(call: &str) -> BridgeResult<(&str, Vec<String>)> {
    let open = call
        .find('(')
        .ok_or_else(|| malformed(call, "missing '('"))?;
    let close = call
        .rfind(')')
        .ok_or_else(|| malformed(call, "missing ')'"))?;
    if close < open {
        return Err(malformed(call, "')' before '('"));
    }

    let args = call[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_string)
        .collect();

    Ok((call[..open].trim(), args))
}

/// Parse `Ns.Path.Class.Method(args)`.
pub fn parse_static_call(call: &str) -> BridgeResult<CallRecord> {
    let (path, args) = split_call(call)?;

    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(malformed(call, "empty path segment"));
    }
    if segments.len() < 3 {
        return Err(malformed(call, "expected Namespace.Class.Method"));
    }

    let (namespace, tail) = segments.split_at(segments.len() - 2);
    Ok(CallRecord {
        namespace: namespace.join("."),
        class: tail[0].to_string(),
        method: tail[1].to_string(),
        args,
    })
}

/// Parse `Method(args)`.
pub fn parse_instance_call(call: &str) -> BridgeResult<InstanceCall> {
    let (name, args) = split_call(call)?;

    if name.is_empty() {
        return Err(malformed(call, "missing method name"));
    }
    if name.contains('.') {
        return Err(malformed(call, "instance method name must be a single segment"));
    }

    Ok(InstanceCall {
        method: name.to_string(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_malformed<T: std::fmt::Debug>(result: BridgeResult<T>) -> bool {
        matches!(result, Err(BridgeError::MalformedCall { .. }))
    }

    #[test]
    fn test_parse_static_call() {
        let record = parse_static_call("Company.Tools.Math.Add(1, 2)").unwrap();
        assert_eq!(record.namespace, "Company.Tools");
        assert_eq!(record.class, "Math");
        assert_eq!(record.method, "Add");
        assert_eq!(record.args, vec!["1", "2"]);
        assert_eq!(record.type_path(), "Company.Tools.Math");
        assert_eq!(record.member_path(), "Company.Tools.Math.Add");
    }

    #[test]
    fn test_empty_argument_list() {
        let record = parse_static_call("Ns.Cls.Method()").unwrap();
        assert_eq!(record.arity(), 0);

        let record = parse_static_call("  Ns.Cls.Method( , ,)  ").unwrap();
        assert!(record.args.is_empty());
    }

    #[test]
    fn test_literals_are_verbatim() {
        let record = parse_static_call("Ns.Cls.Say( \"hi there\" ,x y)").unwrap();
        assert_eq!(record.args, vec!["\"hi there\"", "x y"]);

        // Inner parentheses belong to the argument text.
        let record = parse_static_call("Ns.Cls.Say((a), b)").unwrap();
        assert_eq!(record.args, vec!["(a)", "b"]);
    }

    #[test]
    fn test_malformed_static_calls() {
        assert!(is_malformed(parse_static_call("Ns.Cls.Method")));
        assert!(is_malformed(parse_static_call("Method(1,2)")));
        assert!(is_malformed(parse_static_call("Cls.Method(1)")));
        assert!(is_malformed(parse_static_call("Ns..Method(1)")));
        assert!(is_malformed(parse_static_call(".Ns.Cls.Method()")));
        assert!(is_malformed(parse_static_call("Ns.Cls.Method)(")));
        assert!(is_malformed(parse_static_call("Ns.Cls.Method(1")));
    }

    #[test]
    fn test_parse_instance_call() {
        let call = parse_instance_call("Push(4, 5)").unwrap();
        assert_eq!(call.method, "Push");
        assert_eq!(call.args, vec!["4", "5"]);

        let call = parse_instance_call(" Reset () ").unwrap();
        assert_eq!(call.method, "Reset");
        assert_eq!(call.arity(), 0);
    }

    #[test]
    fn test_malformed_instance_calls() {
        assert!(is_malformed(parse_instance_call("(1)")));
        assert!(is_malformed(parse_instance_call("Obj.Push(1)")));
        assert!(is_malformed(parse_instance_call("Push")));
    }
}
