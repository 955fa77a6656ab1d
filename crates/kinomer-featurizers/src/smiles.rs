//! Minimal SMILES reader backing the ligand featurizers.
//!
//! Covers the organic subset, bracket atoms, explicit bonds, branches and
//! ring closures (including `%nn`). Stereo markers and isotopes are parsed
//! and discarded; the featurizers only consume connectivity, element,
//! charge and aromaticity.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmilesError {
    #[error("empty SMILES string")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unclosed branch (missing ')')")]
    UnclosedBranch,

    #[error("unbalanced branch close at position {pos}")]
    UnbalancedClose { pos: usize },

    #[error("ring bond {label} opened but never closed")]
    UnclosedRing { label: u32 },

    #[error("unterminated bracket atom at position {pos}")]
    UnterminatedBracket { pos: usize },

    #[error("bond at position {pos} has no preceding atom")]
    DanglingBond { pos: usize },
}

/// Bond orders; aromatic bonds are kept distinct from single bonds so
/// fingerprint invariants can tell them apart.
pub const BOND_SINGLE: u8 = 1;
pub const BOND_DOUBLE: u8 = 2;
pub const BOND_TRIPLE: u8 = 3;
pub const BOND_AROMATIC: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MolAtom {
    pub element: String,
    pub aromatic: bool,
    pub charge: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MolBond {
    pub a: usize,
    pub b: usize,
    pub order: u8,
}

/// A small-molecule graph parsed from SMILES.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Molecule {
    atoms: Vec<MolAtom>,
    bonds: Vec<MolBond>,
}

impl Molecule {
    pub fn from_smiles(smiles: &str) -> Result<Self, SmilesError> {
        Parser::new(smiles).parse()
    }

    pub fn atoms(&self) -> &[MolAtom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[MolBond] {
        &self.bonds
    }

    /// Neighbor indices of `idx` with the connecting bond order.
    pub fn neighbors(&self, idx: usize) -> Vec<(usize, u8)> {
        let mut out = Vec::new();
        for bond in &self.bonds {
            if bond.a == idx {
                out.push((bond.b, bond.order));
            } else if bond.b == idx {
                out.push((bond.a, bond.order));
            }
        }
        out
    }

    pub fn degree(&self, idx: usize) -> usize {
        self.bonds
            .iter()
            .filter(|b| b.a == idx || b.b == idx)
            .count()
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            src,
        }
    }

    fn parse(mut self) -> Result<Molecule, SmilesError> {
        if self.src.trim().is_empty() {
            return Err(SmilesError::Empty);
        }

        let mut atoms: Vec<MolAtom> = Vec::new();
        let mut bonds: Vec<MolBond> = Vec::new();
        let mut branch_stack: Vec<usize> = Vec::new();
        let mut rings: HashMap<u32, (usize, Option<u8>)> = HashMap::new();
        let mut prev: Option<usize> = None;
        let mut pending_bond: Option<u8> = None;

        while self.pos < self.chars.len() {
            let pos = self.pos;
            let ch = self.chars[pos];
            match ch {
                '-' | '/' | '\\' => {
                    self.expect_atom_follows(pos)?;
                    pending_bond = Some(BOND_SINGLE);
                    self.pos += 1;
                }
                '=' => {
                    self.expect_atom_follows(pos)?;
                    pending_bond = Some(BOND_DOUBLE);
                    self.pos += 1;
                }
                '#' => {
                    self.expect_atom_follows(pos)?;
                    pending_bond = Some(BOND_TRIPLE);
                    self.pos += 1;
                }
                ':' => {
                    self.expect_atom_follows(pos)?;
                    pending_bond = Some(BOND_AROMATIC);
                    self.pos += 1;
                }
                '(' => {
                    match prev {
                        Some(idx) => branch_stack.push(idx),
                        None => return Err(SmilesError::DanglingBond { pos }),
                    }
                    self.pos += 1;
                }
                ')' => {
                    prev = Some(
                        branch_stack
                            .pop()
                            .ok_or(SmilesError::UnbalancedClose { pos })?,
                    );
                    self.pos += 1;
                }
                '.' => {
                    prev = None;
                    pending_bond = None;
                    self.pos += 1;
                }
                '0'..='9' => {
                    let label = ch.to_digit(10).expect("digit");
                    self.pos += 1;
                    self.close_or_open_ring(
                        label,
                        prev.ok_or(SmilesError::DanglingBond { pos })?,
                        &mut pending_bond,
                        &mut rings,
                        &mut bonds,
                        &atoms,
                    );
                }
                '%' => {
                    let label = self.read_two_digit_label(pos)?;
                    self.close_or_open_ring(
                        label,
                        prev.ok_or(SmilesError::DanglingBond { pos })?,
                        &mut pending_bond,
                        &mut rings,
                        &mut bonds,
                        &atoms,
                    );
                }
                '[' => {
                    let atom = self.read_bracket_atom(pos)?;
                    let idx = atoms.len();
                    atoms.push(atom);
                    self.bond_to_prev(idx, prev, &mut pending_bond, &mut bonds, &atoms);
                    prev = Some(idx);
                }
                _ => {
                    let atom = self.read_organic_atom(pos)?;
                    let idx = atoms.len();
                    atoms.push(atom);
                    self.bond_to_prev(idx, prev, &mut pending_bond, &mut bonds, &atoms);
                    prev = Some(idx);
                }
            }
        }

        if !branch_stack.is_empty() {
            return Err(SmilesError::UnclosedBranch);
        }
        if let Some((&label, _)) = rings.iter().next() {
            return Err(SmilesError::UnclosedRing { label });
        }

        Ok(Molecule { atoms, bonds })
    }

    fn expect_atom_follows(&self, pos: usize) -> Result<(), SmilesError> {
        if self.pos + 1 >= self.chars.len() {
            return Err(SmilesError::DanglingBond { pos });
        }
        Ok(())
    }

    fn bond_to_prev(
        &self,
        idx: usize,
        prev: Option<usize>,
        pending: &mut Option<u8>,
        bonds: &mut Vec<MolBond>,
        atoms: &[MolAtom],
    ) {
        if let Some(p) = prev {
            let order = pending
                .take()
                .unwrap_or_else(|| implicit_order(&atoms[p], &atoms[idx]));
            bonds.push(MolBond { a: p, b: idx, order });
        } else {
            *pending = None;
        }
    }

    fn close_or_open_ring(
        &self,
        label: u32,
        current: usize,
        pending: &mut Option<u8>,
        rings: &mut HashMap<u32, (usize, Option<u8>)>,
        bonds: &mut Vec<MolBond>,
        atoms: &[MolAtom],
    ) {
        match rings.remove(&label) {
            Some((partner, opened_with)) => {
                let order = pending
                    .take()
                    .or(opened_with)
                    .unwrap_or_else(|| implicit_order(&atoms[partner], &atoms[current]));
                bonds.push(MolBond {
                    a: partner,
                    b: current,
                    order,
                });
            }
            None => {
                rings.insert(label, (current, pending.take()));
            }
        }
    }

    fn read_two_digit_label(&mut self, pos: usize) -> Result<u32, SmilesError> {
        // '%' followed by exactly two digits
        let d1 = self.chars.get(pos + 1).and_then(|c| c.to_digit(10));
        let d2 = self.chars.get(pos + 2).and_then(|c| c.to_digit(10));
        match (d1, d2) {
            (Some(a), Some(b)) => {
                self.pos = pos + 3;
                Ok(a * 10 + b)
            }
            _ => Err(SmilesError::UnexpectedChar { pos, ch: '%' }),
        }
    }

    fn read_organic_atom(&mut self, pos: usize) -> Result<MolAtom, SmilesError> {
        let ch = self.chars[pos];
        // Two-letter elements first
        if ch == 'C' && self.chars.get(pos + 1) == Some(&'l') {
            self.pos = pos + 2;
            return Ok(plain("Cl"));
        }
        if ch == 'B' && self.chars.get(pos + 1) == Some(&'r') {
            self.pos = pos + 2;
            return Ok(plain("Br"));
        }
        let atom = match ch {
            'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' => plain(&ch.to_string()),
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => MolAtom {
                element: ch.to_uppercase().to_string(),
                aromatic: true,
                charge: 0,
            },
            _ => return Err(SmilesError::UnexpectedChar { pos, ch }),
        };
        self.pos = pos + 1;
        Ok(atom)
    }

    fn read_bracket_atom(&mut self, open: usize) -> Result<MolAtom, SmilesError> {
        let close = (open + 1..self.chars.len())
            .find(|&i| self.chars[i] == ']')
            .ok_or(SmilesError::UnterminatedBracket { pos: open })?;
        let body: String = self.chars[open + 1..close].iter().collect();
        self.pos = close + 1;

        let mut rest = body.as_str();
        // isotope prefix
        rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        let mut chars = rest.chars();
        let first = chars
            .next()
            .ok_or(SmilesError::UnterminatedBracket { pos: open })?;
        if !first.is_ascii_alphabetic() {
            return Err(SmilesError::UnexpectedChar {
                pos: open,
                ch: first,
            });
        }
        let (element, aromatic, consumed) = if first.is_lowercase() {
            (first.to_uppercase().to_string(), true, 1)
        } else {
            match chars.next() {
                Some(second) if second.is_ascii_lowercase() => {
                    (format!("{first}{second}"), false, 2)
                }
                _ => (first.to_string(), false, 1),
            }
        };
        rest = &rest[consumed..];

        // skip chirality and explicit hydrogen count
        rest = rest.trim_start_matches('@');
        if let Some(stripped) = rest.strip_prefix('H') {
            rest = stripped.trim_start_matches(|c: char| c.is_ascii_digit());
        }

        let mut charge: i8 = 0;
        let mut rest_chars = rest.chars().peekable();
        while let Some(&c) = rest_chars.peek() {
            match c {
                '+' => {
                    charge += 1;
                    rest_chars.next();
                }
                '-' => {
                    charge -= 1;
                    rest_chars.next();
                }
                '0'..='9' => {
                    let digit = c.to_digit(10).expect("digit") as i8;
                    charge = charge.signum() * digit;
                    rest_chars.next();
                }
                // atom maps are ignored
                ':' => break,
                _ => return Err(SmilesError::UnexpectedChar { pos: open, ch: c }),
            }
        }

        Ok(MolAtom {
            element,
            aromatic,
            charge,
        })
    }
}

fn plain(element: &str) -> MolAtom {
    MolAtom {
        element: element.to_string(),
        aromatic: false,
        charge: 0,
    }
}

fn implicit_order(a: &MolAtom, b: &MolAtom) -> u8 {
    if a.aromatic && b.aromatic {
        BOND_AROMATIC
    } else {
        BOND_SINGLE
    }
}
