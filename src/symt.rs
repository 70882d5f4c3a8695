use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Name;
use crate::check::Type;

pub type Labl = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Formal,
    Local,
    Temp,
}

/// What the table knows about one name: how it was introduced, its declared
/// type, and the frame slot it occupies. Slots are handed out in insertion
/// order with the formals first, and the back end lays frames out from them.
#[derive(Debug, Clone)]
pub struct SymInfo {
    pub name: Name,
    pub kind: SymKind,
    pub ty: Type,
    pub slot: usize,
}

/// One scope's symbol table. Each definition owns one, the main script owns
/// one, and a global table underneath them all owns the string literal pool
/// and the counters that mint fresh temporary and label names. The
/// per-function tables reach the global one through a parent link, so minted
/// names are unique across the whole compilation.
#[derive(Debug, Default)]
pub struct SymT {
    infos: Vec<SymInfo>,
    index: HashMap<Name, usize>,
    frmls: usize,
    tmps: u32,
    labls: u32,
    strgs: HashMap<String, Labl>,
    strg_list: Vec<(Labl, String)>,
    parent: Option<Rc<RefCell<SymT>>>,
}

impl SymT {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time wiring to the global table.
    pub fn set_parent(&mut self, parent: Rc<RefCell<SymT>>) {
        self.parent = Some(parent);
    }

    /// Append a formal. Returns `None` when the name is taken. Formals must
    /// all be added before any local so they occupy the slot prefix.
    pub fn add_frml(&mut self, name: &str, ty: Type) -> Option<usize> {
        if self.index.contains_key(name) {
            return None;
        }
        let slot = self.infos.len();
        self.index.insert(name.to_string(), slot);
        self.infos.push(SymInfo {
            name: name.to_string(),
            kind: SymKind::Formal,
            ty,
            slot,
        });
        self.frmls += 1;
        Some(slot)
    }

    /// Append a local. Returns `None` when the name is taken.
    pub fn add_locl(&mut self, name: &str, ty: Type) -> Option<usize> {
        if self.index.contains_key(name) {
            return None;
        }
        let slot = self.infos.len();
        self.index.insert(name.to_string(), slot);
        self.infos.push(SymInfo {
            name: name.to_string(),
            kind: SymKind::Local,
            ty,
            slot,
        });
        Some(slot)
    }

    /// Mint a fresh temporary, register it in this scope, return its name.
    pub fn add_temp(&mut self, ty: Type) -> Name {
        let name = format!("$t{}", self.mint_temp());
        let slot = self.infos.len();
        self.index.insert(name.clone(), slot);
        self.infos.push(SymInfo {
            name: name.clone(),
            kind: SymKind::Temp,
            ty,
            slot,
        });
        name
    }

    /// Mint a fresh label. A hint names the label outright, which the entry
    /// and exit labels of definitions rely on; without one the label is a
    /// fresh `$L<n>`.
    pub fn add_labl(&mut self, hint: Option<&str>) -> Labl {
        match hint {
            Some(h) => h.to_string(),
            None => format!("$L{}", self.mint_labl()),
        }
    }

    /// Intern a string literal in the global pool; equal content yields the
    /// same label.
    pub fn add_strg(&mut self, text: &str) -> Labl {
        if let Some(parent) = &self.parent {
            return parent.borrow_mut().add_strg(text);
        }
        if let Some(labl) = self.strgs.get(text) {
            return labl.clone();
        }
        let labl = format!("$S{}", self.strg_list.len());
        self.strgs.insert(text.to_string(), labl.clone());
        self.strg_list.push((labl.clone(), text.to_string()));
        labl
    }

    pub fn has_info(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get_info(&self, name: &str) -> Option<&SymInfo> {
        self.index.get(name).map(|&i| &self.infos[i])
    }

    pub fn get_frml(&self, i: usize) -> &SymInfo {
        &self.infos[i]
    }

    /// Number of formals; they sit in slots `[0, arity)`.
    pub fn arity(&self) -> usize {
        self.frmls
    }

    /// Number of entries of every kind.
    pub fn size(&self) -> usize {
        self.infos.len()
    }

    /// All entries in slot order: formals, then locals and temporaries as
    /// they were introduced.
    pub fn infos(&self) -> &[SymInfo] {
        &self.infos
    }

    /// The interned string pool in interning order. Only meaningful on the
    /// global table.
    pub fn strg_pool(&self) -> &[(Labl, String)] {
        &self.strg_list
    }

    fn mint_temp(&mut self) -> u32 {
        if let Some(parent) = &self.parent {
            return parent.borrow_mut().mint_temp();
        }
        let n = self.tmps;
        self.tmps += 1;
        n
    }

    fn mint_labl(&mut self) -> u32 {
        if let Some(parent) = &self.parent {
            return parent.borrow_mut().mint_labl();
        }
        let n = self.labls;
        self.labls += 1;
        n
    }
}
