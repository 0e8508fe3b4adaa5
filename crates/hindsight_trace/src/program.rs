//! Static model of the recorded program.
//!
//! The engine needs a small amount of static knowledge alongside the dynamic
//! trace: which method an instruction belongs to and where, which branches
//! guard it, which handlers protect it, where its operands come from, and how
//! calls dispatch.

use std::collections::HashSet;

use hindsight_foundation::{ClassId, InstructionId, LoopPathId, MethodId};

// =============================================================================
// Program Elements
// =============================================================================

/// A class of the recorded program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Class {
    /// Class identifier.
    pub id: ClassId,
    /// Fully qualified name, for presentation.
    pub name: String,
    /// Direct superclass, if any.
    pub superclass: Option<ClassId>,
}

/// A method of the recorded program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    /// Method identifier.
    pub id: MethodId,
    /// Declaring class.
    pub class: ClassId,
    /// Simple name; overriding methods share it.
    pub name: String,
    /// Static methods have no implicit receiver.
    pub is_static: bool,
    /// Invoked from outside the recorded code (`main`, framework callbacks).
    pub is_entry_point: bool,
    /// Instructions in position order.
    pub instructions: Vec<InstructionId>,
}

/// What an instruction does, as far as the analyses care.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    /// Conditional branch.
    Branch,
    /// Call of the declared target method.
    Invoke {
        /// Statically declared target; dispatch may reach an override.
        target: MethodId,
    },
    /// Reads the enclosing method's parameter (index 0 is `this` for instance methods).
    LoadParameter {
        /// Parameter index.
        index: usize,
    },
    /// Forwards its first operand unchanged (casts, duplicates, local store/load pairs).
    Passthrough,
    /// Allocates an instance of a class.
    New {
        /// Allocated class.
        class: ClassId,
    },
    /// Returns from the method.
    Return,
    /// Throws an exception.
    Throw,
    /// First instruction of an exception handler.
    Handler,
    /// Anything else.
    Other,
}

/// A statically known path through a loop body, starting at a branch.
///
/// The path lists the branch instructions executed, in order, during one
/// iteration that starts at the owning branch (the owning branch included).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopPath {
    /// Path identifier.
    pub id: LoopPathId,
    /// Branch instructions executed along the path.
    pub branches: Vec<InstructionId>,
}

/// A single instruction of the recorded program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Instruction identifier.
    pub id: InstructionId,
    /// Enclosing method.
    pub method: MethodId,
    /// Position within the enclosing method.
    pub position: u32,
    /// What the instruction does.
    pub kind: InstructionKind,
    /// Static producer of each operand, where one is known.
    pub operands: Vec<Option<InstructionId>>,
    /// Branches that decide whether this instruction executes.
    pub guards: Vec<InstructionId>,
    /// Handlers of the exception-protected regions containing this instruction.
    pub handlers: Vec<InstructionId>,
    /// Loop paths starting at this instruction (branches only).
    pub loop_paths: Vec<LoopPath>,
}

impl Instruction {
    /// Returns true if this is a conditional branch.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, InstructionKind::Branch)
    }

    /// Returns the declared target if this is a call.
    #[must_use]
    pub fn invoked(&self) -> Option<MethodId> {
        match self.kind {
            InstructionKind::Invoke { target } => Some(target),
            _ => None,
        }
    }

    /// Returns true if the instruction lies inside an exception-protected region.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        !self.handlers.is_empty()
    }
}

// =============================================================================
// Program
// =============================================================================

/// The static program a trace was recorded from.
#[derive(Clone, Debug, Default)]
pub struct Program {
    classes: Vec<Class>,
    methods: Vec<Method>,
    instructions: Vec<Instruction>,
}

impl Program {
    /// Returns a class by id.
    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.as_usize())
    }

    /// Returns a method by id.
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.methods.get(id.as_usize())
    }

    /// Returns an instruction by id.
    #[must_use]
    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.get(id.as_usize())
    }

    /// Returns the method enclosing an instruction.
    #[must_use]
    pub fn method_of(&self, instruction: InstructionId) -> Option<&Method> {
        self.instruction(instruction)
            .and_then(|i| self.method(i.method))
    }

    /// Returns all instructions in id order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns all methods in id order.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Returns all classes in id order.
    #[must_use]
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    /// Returns true if `class` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        let mut seen = HashSet::new();
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            current = self.class(id).and_then(|c| c.superclass);
        }
        false
    }

    /// Resolves a virtual call of `name` on an instance of `class`.
    ///
    /// Walks the superclass chain from `class` and returns the first
    /// non-static method with that name.
    #[must_use]
    pub fn resolve(&self, class: ClassId, name: &str) -> Option<MethodId> {
        let mut current = Some(class);
        let mut seen = HashSet::new();
        while let Some(id) = current {
            if !seen.insert(id) {
                return None;
            }
            if let Some(found) = self
                .methods
                .iter()
                .find(|m| m.class == id && !m.is_static && m.name == name)
            {
                return Some(found.id);
            }
            current = self.class(id).and_then(|c| c.superclass);
        }
        None
    }

    /// Returns true if a call at `call_site` on a receiver of `receiver_class`
    /// dispatches to `method`.
    #[must_use]
    pub fn dispatches_to(
        &self,
        call_site: InstructionId,
        receiver_class: ClassId,
        method: MethodId,
    ) -> bool {
        let Some(target) = self
            .instruction(call_site)
            .and_then(Instruction::invoked)
            .and_then(|t| self.method(t))
        else {
            return false;
        };
        if target.is_static {
            return target.id == method;
        }
        self.is_subclass_of(receiver_class, target.class)
            && self.resolve(receiver_class, &target.name) == Some(method)
    }

    /// Returns every call site that could reach `method`.
    ///
    /// A call site qualifies if it declares `method` itself, or declares a
    /// method of the same name in a superclass of `method`'s class that
    /// `method` overrides.
    #[must_use]
    pub fn call_sites_of(&self, method: MethodId) -> Vec<InstructionId> {
        let Some(callee) = self.method(method) else {
            return Vec::new();
        };
        self.instructions
            .iter()
            .filter(|i| {
                i.invoked().is_some_and(|target| {
                    target == method
                        || (!callee.is_static
                            && self.method(target).is_some_and(|declared| {
                                !declared.is_static
                                    && declared.name == callee.name
                                    && self.is_subclass_of(callee.class, declared.class)
                            }))
                })
            })
            .map(|i| i.id)
            .collect()
    }

    /// Traces an operand of `instruction` back to a parameter of its method.
    ///
    /// Follows static producers through [`InstructionKind::Passthrough`]
    /// instructions. Returns `None` when the value is computed locally or
    /// its producer is unknown.
    #[must_use]
    pub fn parameter_source(&self, instruction: InstructionId, operand: usize) -> Option<usize> {
        let mut producer = self.instruction(instruction)?.operands.get(operand).copied()??;
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(producer) {
                return None;
            }
            let producing = self.instruction(producer)?;
            match producing.kind {
                InstructionKind::LoadParameter { index } => return Some(index),
                InstructionKind::Passthrough => {
                    producer = producing.operands.first().copied()??;
                }
                _ => return None,
            }
        }
    }
}

// =============================================================================
// Program Builder
// =============================================================================

/// Incremental construction of a [`Program`].
///
/// Instructions are appended to their method in position order.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
    next_loop_path: u32,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class.
    pub fn class(&mut self, name: impl Into<String>, superclass: Option<ClassId>) -> ClassId {
        let id = ClassId::new(index_u32(self.program.classes.len()));
        self.program.classes.push(Class {
            id,
            name: name.into(),
            superclass,
        });
        id
    }

    /// Adds an instance method.
    pub fn method(&mut self, class: ClassId, name: impl Into<String>) -> MethodId {
        self.add_method(class, name.into(), false)
    }

    /// Adds a static method.
    pub fn static_method(&mut self, class: ClassId, name: impl Into<String>) -> MethodId {
        self.add_method(class, name.into(), true)
    }

    fn add_method(&mut self, class: ClassId, name: String, is_static: bool) -> MethodId {
        let id = MethodId::new(index_u32(self.program.methods.len()));
        self.program.methods.push(Method {
            id,
            class,
            name,
            is_static,
            is_entry_point: false,
            instructions: Vec::new(),
        });
        id
    }

    /// Marks a method as invoked from outside the recorded code.
    ///
    /// # Panics
    ///
    /// Panics if the method was not added to this builder.
    pub fn entry_point(&mut self, method: MethodId) -> &mut Self {
        self.method_mut(method).is_entry_point = true;
        self
    }

    /// Appends an instruction to a method.
    ///
    /// # Panics
    ///
    /// Panics if the method was not added to this builder.
    pub fn instruction(&mut self, method: MethodId, kind: InstructionKind) -> InstructionId {
        let id = InstructionId::new(index_u32(self.program.instructions.len()));
        let owner = self.method_mut(method);
        let position = index_u32(owner.instructions.len());
        owner.instructions.push(id);
        self.program.instructions.push(Instruction {
            id,
            method,
            position,
            kind,
            operands: Vec::new(),
            guards: Vec::new(),
            handlers: Vec::new(),
            loop_paths: Vec::new(),
        });
        id
    }

    /// Appends a call with statically known operand producers.
    pub fn invoke(
        &mut self,
        method: MethodId,
        target: MethodId,
        operands: &[InstructionId],
    ) -> InstructionId {
        let id = self.instruction(method, InstructionKind::Invoke { target });
        self.operands(id, operands);
        id
    }

    /// Appends a read of one of the method's parameters.
    pub fn load_parameter(&mut self, method: MethodId, index: usize) -> InstructionId {
        self.instruction(method, InstructionKind::LoadParameter { index })
    }

    /// Sets the static producers of an instruction's operands.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was not added to this builder.
    pub fn operands(&mut self, instruction: InstructionId, producers: &[InstructionId]) -> &mut Self {
        self.instruction_mut(instruction).operands = producers.iter().copied().map(Some).collect();
        self
    }

    /// Records that `branch` decides whether `instruction` executes.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was not added to this builder.
    pub fn guard(&mut self, instruction: InstructionId, branch: InstructionId) -> &mut Self {
        self.instruction_mut(instruction).guards.push(branch);
        self
    }

    /// Records that `handler` protects `instruction`.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was not added to this builder.
    pub fn handler(&mut self, instruction: InstructionId, handler: InstructionId) -> &mut Self {
        self.instruction_mut(instruction).handlers.push(handler);
        self
    }

    /// Adds a loop path starting at `branch`.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was not added to this builder.
    pub fn loop_path(&mut self, branch: InstructionId, branches: Vec<InstructionId>) -> LoopPathId {
        let id = LoopPathId::new(self.next_loop_path);
        self.next_loop_path += 1;
        self.instruction_mut(branch)
            .loop_paths
            .push(LoopPath { id, branches });
        id
    }

    /// Finishes construction.
    #[must_use]
    pub fn build(self) -> Program {
        self.program
    }

    fn method_mut(&mut self, method: MethodId) -> &mut Method {
        self.program
            .methods
            .get_mut(method.as_usize())
            .unwrap_or_else(|| panic!("method {method} is not part of this program"))
    }

    fn instruction_mut(&mut self, instruction: InstructionId) -> &mut Instruction {
        self.program
            .instructions
            .get_mut(instruction.as_usize())
            .unwrap_or_else(|| panic!("instruction {instruction} is not part of this program"))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn index_u32(len: usize) -> u32 {
    len as u32
}
