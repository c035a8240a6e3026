/// Sequential alias source: `$1, $2, …`, `$c1, $c2, …`
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    prefix: &'static str,
    next: usize,
}

impl AliasGenerator {
    pub const TABLE: &'static str = "$";
    pub const COLUMN: &'static str = "$c";
    pub const BINDING: &'static str = "$a";

    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 1 }
    }

    pub fn generate(&mut self) -> String {
        let alias = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        alias
    }
}
