// src/analysis/call_graph/method_locator.rs
use std::path::Path;
use tracing::debug;

use crate::error::{CallflowError, Result};
use super::{MethodDeclaration, SyntaxProvider};

/// Finds the method a caret sits in
pub struct MethodLocator<'m, S: SyntaxProvider + ?Sized> {
    syntax: &'m S,
}

impl<'m, S: SyntaxProvider + ?Sized> MethodLocator<'m, S> {
    pub fn new(syntax: &'m S) -> Self {
        Self { syntax }
    }

    /// Innermost method declaration containing the zero-based character
    /// offset. Methods of anonymous and local classes win over the method
    /// around them.
    pub fn locate(&self, file: &Path, offset: usize) -> Result<MethodDeclaration> {
        match self.syntax.enclosing_method_at(file, offset)? {
            Some(method) => {
                debug!("Offset {} in {} is inside {}", offset, file.display(), method.key);
                Ok(method)
            }
            None => Err(CallflowError::NoEnclosingMethod {
                file: file.to_path_buf(),
                offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::call_graph::SourceIndex;
    use crate::analysis::CodeParser;
    use crate::config::Config;

    const SOURCE: &str = r#"package demo;

import java.util.List;

public class Greeter {
    private final String prefix = "Hello, ";

    public String greet(String name) {
        Runnable hook = new Runnable() {
            @Override
            public void run() { System.out.println(name); }
        };
        hook.run();
        return prefix + name;
    }
}
"#;

    fn index() -> SourceIndex {
        let mut parser = CodeParser::new(&Config::default().parsing).unwrap();
        let file = parser.parse_source("Greeter.java", SOURCE.to_string()).unwrap();
        SourceIndex::new(vec![file])
    }

    #[test]
    fn test_locates_enclosing_method() {
        let index = index();
        let locator = MethodLocator::new(&index);
        let offset = SOURCE.find("return prefix").unwrap();

        let method = locator.locate(Path::new("Greeter.java"), offset).unwrap();
        assert_eq!(method.key.to_string(), "demo.Greeter#greet(String)");
        assert_eq!(method.location.line, 8);
    }

    #[test]
    fn test_anonymous_class_method_takes_precedence() {
        let index = index();
        let locator = MethodLocator::new(&index);
        let offset = SOURCE.find("System.out").unwrap();

        let method = locator.locate(Path::new("Greeter.java"), offset).unwrap();
        assert_eq!(method.key.to_string(), "demo.Greeter$1#run()");
    }

    #[test]
    fn test_offsets_outside_methods_are_not_found() {
        let index = index();
        let locator = MethodLocator::new(&index);

        for needle in ["import java", "\"Hello, \""] {
            let offset = SOURCE.find(needle).unwrap();
            let result = locator.locate(Path::new("Greeter.java"), offset);
            assert!(
                matches!(result, Err(CallflowError::NoEnclosingMethod { offset: o, .. }) if o == offset),
                "offset of {} should be outside any method",
                needle
            );
        }
    }
}
