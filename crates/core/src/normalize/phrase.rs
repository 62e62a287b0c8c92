use std::collections::HashMap;

/// Multi-token rewrite table applied greedily left to right, longest match first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhraseTable {
    entries: HashMap<Vec<String>, Vec<String>>,
    longest: usize,
}

impl PhraseTable {
    pub fn insert(&mut self, source: Vec<String>, target: Vec<String>) {
        if source.is_empty() {
            return;
        }
        self.longest = self.longest.max(source.len());
        self.entries.insert(source, target);
    }

    pub fn remove(&mut self, source: &[String]) -> bool {
        let removed = self.entries.remove(source).is_some();
        if removed {
            self.longest = self.entries.keys().map(Vec::len).max().unwrap_or(0);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&[String], &[String])> {
        self.entries.iter().map(|(source, target)| (source.as_slice(), target.as_slice()))
    }

    pub fn rewrite(&self, tokens: Vec<String>) -> Vec<String> {
        if self.entries.is_empty() {
            return tokens;
        }

        let mut rewritten = Vec::with_capacity(tokens.len());
        let mut position = 0;
        'scan: while position < tokens.len() {
            let widest = self.longest.min(tokens.len() - position);
            for width in (1..=widest).rev() {
                if let Some(target) = self.entries.get(&tokens[position..position + width]) {
                    rewritten.extend(target.iter().cloned());
                    position += width;
                    continue 'scan;
                }
            }
            rewritten.push(tokens[position].clone());
            position += 1;
        }
        rewritten
    }
}
