//! The type system surface the middle end consumes. Type checking has already
//! happened, so this only answers questions about types which were resolved
//! earlier: subtyping, field types, overload resolution for calls the lowering
//! synthesizes itself (like `equal` for object comparisons), etc.
//!
//! A [`TypeContext`] is created once per compilation and passed by shared
//! reference into every phase.

use bitflags::bitflags;
use colored::Colorize;
use hashbrown::HashMap;
use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::{
    index::{IndexVec, simple_index},
    middle::primitive::PrimitiveKind,
    span::Span,
};

simple_index! {
    /// Identifies a type registered in a [`TypeContext`]
    pub struct TypeId;
}

simple_index! {
    /// Identifies a method, create or destroy signature
    pub struct SignatureId;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct Modifiers: u16 {
        const NULLABLE = 1 << 0;
        const MUTABLE = 1 << 1;
        const IMMUTABLE = 1 << 2;
        const READONLY = 1 << 3;
        const PUBLIC = 1 << 4;
        const PROTECTED = 1 << 5;
        const PRIVATE = 1 << 6;
        const LOCKED = 1 << 7;
        const CONSTANT = 1 << 8;
        const ABSTRACT = 1 << 9;
        const NATIVE = 1 << 10;
        const IMPORT = 1 << 11;
    }
}

impl Modifiers {
    pub fn is_nullable(&self) -> bool {
        self.contains(Modifiers::NULLABLE)
    }

    pub fn is_private(&self) -> bool {
        self.contains(Modifiers::PRIVATE)
    }

    pub fn is_locked(&self) -> bool {
        self.contains(Modifiers::LOCKED)
    }

    pub fn is_constant(&self) -> bool {
        self.contains(Modifiers::CONSTANT)
    }

    /// Abstract, native and imported methods have no body to compile
    pub fn is_bodiless(&self) -> bool {
        self.intersects(Modifiers::ABSTRACT | Modifiers::NATIVE | Modifiers::IMPORT)
    }
}

/// A type together with the modifiers of the value or declaration it describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModifiedType {
    pub ty: TypeId,
    pub modifiers: Modifiers,
}

impl ModifiedType {
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            modifiers: Modifiers::empty(),
        }
    }

    pub fn with(mut self, modifiers: Modifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    pub fn nullable(self) -> Self {
        self.with(Modifiers::NULLABLE)
    }
}

impl From<TypeId> for ModifiedType {
    fn from(ty: TypeId) -> Self {
        Self::new(ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Class(ClassType),
    Interface(ClassType),
    /// `int[]` has one dimension, `int[,]` two. `int[][]` is an array of
    /// `int[]` with one dimension.
    Array {
        element: TypeId,
        dimensions: u32,
    },
    /// The type of the `null` literal
    Null,
    /// Several values carried as one, e.g. the results of a method returning
    /// more than one value
    Sequence(Vec<ModifiedType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassType {
    pub name: String,
    pub outer: Option<TypeId>,
    /// Parent class. For interfaces this is unused and `implements` holds the
    /// extended interfaces.
    pub extends: Option<TypeId>,
    pub implements: Vec<TypeId>,
    pub fields: Vec<FieldType>,
    pub signatures: Vec<SignatureId>,
}

impl ClassType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outer: None,
            extends: None,
            implements: Vec::new(),
            fields: Vec::new(),
            signatures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    pub name: String,
    pub ty: ModifiedType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    Method,
    Create,
    Destroy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub name: String,
    pub owner: TypeId,
    pub kind: SignatureKind,
    pub parameters: Vec<ModifiedType>,
    pub returns: Vec<ModifiedType>,
    /// Type of a call's value: the single return type, or a sequence of them
    pub result: Option<ModifiedType>,
    pub modifiers: Modifiers,
    pub span: Span,
    /// Deterministic symbol derived from the owner, name and parameter types
    pub mangled_name: String,
}

impl MethodSignature {
    pub fn is_create(&self) -> bool {
        self.kind == SignatureKind::Create
    }

    pub fn is_bodiless(&self) -> bool {
        self.modifiers.is_bodiless()
    }
}

#[derive(Debug, Clone)]
pub struct TypeContext {
    types: IndexVec<TypeId, TypeKind>,
    signatures: IndexVec<SignatureId, MethodSignature>,
    primitives: HashMap<PrimitiveKind, TypeId>,
    arrays: HashMap<(TypeId, u32), TypeId>,
    sequences: HashMap<Vec<ModifiedType>, TypeId>,
    null: TypeId,
    object: TypeId,
    string: TypeId,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    pub fn new() -> Self {
        let mut types = IndexVec::new();
        let mut primitives = HashMap::new();

        for kind in PrimitiveKind::iter() {
            primitives.insert(kind, types.push(TypeKind::Primitive(kind)));
        }

        let null = types.push(TypeKind::Null);
        let object = types.push(TypeKind::Class(ClassType::new("Object")));

        let mut string = ClassType::new("String");
        string.extends = Some(object);
        let string = types.push(TypeKind::Class(string));

        Self {
            types,
            signatures: IndexVec::new(),
            primitives,
            arrays: HashMap::new(),
            sequences: HashMap::new(),
            null,
            object,
            string,
        }
    }

    /* Registration */

    pub fn add_class(&mut self, class: ClassType) -> TypeId {
        self.types.push(TypeKind::Class(class))
    }

    pub fn add_interface(&mut self, interface: ClassType) -> TypeId {
        self.types.push(TypeKind::Interface(interface))
    }

    /// Adds a field to an already registered class
    pub fn add_field(&mut self, class: TypeId, name: impl Into<String>, ty: ModifiedType) {
        if let Some(class) = self.class_mut(class) {
            class.fields.push(FieldType {
                name: name.into(),
                ty,
            });
        }
    }

    pub fn add_signature(
        &mut self,
        owner: TypeId,
        name: impl Into<String>,
        kind: SignatureKind,
        parameters: Vec<ModifiedType>,
        returns: Vec<ModifiedType>,
        modifiers: Modifiers,
        span: Span,
    ) -> SignatureId {
        let name = name.into();
        let mangled_name = format!(
            "{}.{}({})",
            self.type_name(owner),
            name,
            parameters.iter().map(|p| self.type_name(p.ty)).join(",")
        );

        let result = match returns.as_slice() {
            [] => None,
            [single] => Some(*single),
            _ => Some(ModifiedType::new(self.sequence_of(returns.clone()))),
        };

        let id = self.signatures.push(MethodSignature {
            name,
            owner,
            kind,
            parameters,
            returns,
            result,
            modifiers,
            span,
            mangled_name,
        });

        if let Some(class) = self.class_mut(owner) {
            class.signatures.push(id);
        }

        id
    }

    /// Interns the array type with the given element type and dimensions
    pub fn array_of(&mut self, element: TypeId, dimensions: u32) -> TypeId {
        if let Some(id) = self.arrays.get(&(element, dimensions)) {
            return *id;
        }

        let id = self.types.push(TypeKind::Array {
            element,
            dimensions,
        });
        self.arrays.insert((element, dimensions), id);
        id
    }

    /// Interns the sequence type of the given element types
    pub fn sequence_of(&mut self, elements: Vec<ModifiedType>) -> TypeId {
        if let Some(id) = self.sequences.get(&elements) {
            return *id;
        }

        let id = self.types.push(TypeKind::Sequence(elements.clone()));
        self.sequences.insert(elements, id);
        id
    }

    /* Lookup */

    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.types[ty]
    }

    pub fn signature(&self, id: SignatureId) -> &MethodSignature {
        &self.signatures[id]
    }

    pub fn signatures(&self) -> impl Iterator<Item = (SignatureId, &MethodSignature)> {
        self.signatures.enumerate()
    }

    pub fn primitive(&self, kind: PrimitiveKind) -> TypeId {
        // every primitive is registered in `new`
        self.primitives[&kind]
    }

    pub fn boolean(&self) -> TypeId {
        self.primitive(PrimitiveKind::Bool)
    }

    pub fn int(&self) -> TypeId {
        self.primitive(PrimitiveKind::Int)
    }

    pub fn null(&self) -> TypeId {
        self.null
    }

    pub fn object(&self) -> TypeId {
        self.object
    }

    pub fn string(&self) -> TypeId {
        self.string
    }

    pub fn class(&self, ty: TypeId) -> Option<&ClassType> {
        match &self.types[ty] {
            TypeKind::Class(class) | TypeKind::Interface(class) => Some(class),
            _ => None,
        }
    }

    fn class_mut(&mut self, ty: TypeId) -> Option<&mut ClassType> {
        match &mut self.types[ty] {
            TypeKind::Class(class) | TypeKind::Interface(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_primitive(&self, ty: TypeId) -> Option<PrimitiveKind> {
        match self.types[ty] {
            TypeKind::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    /// Element type and dimension count of an array type
    pub fn as_array(&self, ty: TypeId) -> Option<(TypeId, u32)> {
        match self.types[ty] {
            TypeKind::Array {
                element,
                dimensions,
            } => Some((element, dimensions)),
            _ => None,
        }
    }

    pub fn as_sequence(&self, ty: TypeId) -> Option<&[ModifiedType]> {
        match &self.types[ty] {
            TypeKind::Sequence(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn is_primitive(&self, ty: TypeId) -> bool {
        matches!(self.types[ty], TypeKind::Primitive(_))
    }

    /// Reference types live on the heap and are reference counted. A sequence
    /// counts as one when any of its elements does.
    pub fn is_reference(&self, ty: TypeId) -> bool {
        match &self.types[ty] {
            TypeKind::Primitive(_) => false,
            TypeKind::Sequence(elements) => elements.iter().any(|e| self.is_reference(e.ty)),
            _ => true,
        }
    }

    pub fn is_interface(&self, ty: TypeId) -> bool {
        matches!(self.types[ty], TypeKind::Interface(_))
    }

    /// Looks up a field declared on `ty` or inherited from a parent class
    pub fn field_type(&self, ty: TypeId, name: &str) -> Option<ModifiedType> {
        let mut current = Some(ty);

        while let Some(ty) = current {
            let class = self.class(ty)?;
            if let Some(field) = class.fields.iter().find(|f| f.name == name) {
                return Some(field.ty);
            }
            current = class.extends;
        }

        None
    }

    /* Relations */

    /// Whether `sub` implements the interface `interface`, directly, through
    /// an extended interface or through a parent class
    pub fn implements(&self, sub: TypeId, interface: TypeId) -> bool {
        let mut stack = vec![sub];
        let mut visited = hashbrown::HashSet::new();

        while let Some(ty) = stack.pop() {
            if !visited.insert(ty) {
                continue;
            }

            let Some(class) = self.class(ty) else {
                continue;
            };

            if class.implements.contains(&interface) {
                return true;
            }

            stack.extend(class.implements.iter().copied());
            stack.extend(class.extends);
        }

        false
    }

    /// Whether a value of type `sub` can be used where `sup` is expected
    /// without an explicit cast. Includes primitive widening.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }

        match (&self.types[sub], &self.types[sup]) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => a.widens_to(*b),
            (TypeKind::Primitive(_), _) | (_, TypeKind::Primitive(_)) => false,
            (TypeKind::Sequence(a), TypeKind::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| self.is_subtype(a.ty, b.ty))
            }
            (TypeKind::Sequence(_), _) | (_, TypeKind::Sequence(_)) => false,
            (TypeKind::Null, _) => true,
            (_, TypeKind::Null) => false,
            (_, TypeKind::Interface(_)) => self.implements(sub, sup),
            (_, TypeKind::Class(_)) if sup == self.object => true,
            (TypeKind::Class(class), TypeKind::Class(_)) => class
                .extends
                .is_some_and(|parent| self.is_subtype(parent, sup)),
            (
                TypeKind::Array {
                    element: a,
                    dimensions: da,
                },
                TypeKind::Array {
                    element: b,
                    dimensions: db,
                },
            ) => da == db && self.is_reference(*a) && self.is_subtype(*a, *b),
            _ => false,
        }
    }

    /// Whether `sup` is a proper supertype of `sub`. Lowering inserts an
    /// upcast when this holds between a declared and an inferred type.
    pub fn is_strict_supertype(&self, sup: TypeId, sub: TypeId) -> bool {
        sup != sub && self.is_subtype(sub, sup)
    }

    /* Overloads */

    /// Picks the most specific signature named `name` on `owner` (or a parent)
    /// which accepts the given argument types. Returns the reasons for
    /// rejecting the call when there is no unique candidate.
    pub fn resolve_overload(
        &self,
        owner: TypeId,
        name: &str,
        arguments: &[TypeId],
    ) -> Result<SignatureId, Vec<String>> {
        let mut candidates = Vec::new();
        let mut current = Some(owner);

        while let Some(ty) = current {
            let Some(class) = self.class(ty) else {
                break;
            };

            for id in &class.signatures {
                let signature = &self.signatures[*id];
                if signature.name == name
                    && signature.parameters.len() == arguments.len()
                    && signature
                        .parameters
                        .iter()
                        .zip(arguments)
                        .all(|(param, arg)| self.is_subtype(*arg, param.ty))
                {
                    candidates.push(*id);
                }
            }

            current = class.extends;
        }

        if candidates.is_empty() {
            return Err(vec![format!(
                "no overload of {}.{name} accepts ({})",
                self.type_name(owner),
                arguments.iter().map(|a| self.type_name(*a)).join(", ")
            )]);
        }

        let more_specific = |a: SignatureId, b: SignatureId| {
            self.signatures[a]
                .parameters
                .iter()
                .zip(&self.signatures[b].parameters)
                .all(|(pa, pb)| self.is_subtype(pa.ty, pb.ty))
        };

        let best = candidates
            .iter()
            .copied()
            .filter(|a| candidates.iter().all(|b| more_specific(*a, *b)))
            .collect::<Vec<_>>();

        match best.as_slice() {
            [single] => Ok(*single),
            // the same signature seen through two parents
            [first, rest @ ..] if rest.iter().all(|r| r == first) => Ok(*first),
            _ => Err(candidates
                .iter()
                .map(|c| format!("ambiguous candidate {}", self.signatures[*c].mangled_name))
                .collect()),
        }
    }

    /* Display */

    pub fn type_name(&self, ty: TypeId) -> String {
        match &self.types[ty] {
            TypeKind::Primitive(kind) => kind.to_string(),
            TypeKind::Class(class) | TypeKind::Interface(class) => match class.outer {
                Some(outer) => format!("{}:{}", self.type_name(outer), class.name),
                None => class.name.clone(),
            },
            TypeKind::Array {
                element,
                dimensions,
            } => format!(
                "{}[{}]",
                self.type_name(*element),
                ",".repeat(*dimensions as usize - 1)
            ),
            TypeKind::Null => "null".to_string(),
            TypeKind::Sequence(elements) => {
                format!("({})", elements.iter().map(|e| self.type_name(e.ty)).join(", "))
            }
        }
    }

    pub fn colored_name(&self, ty: TypeId) -> colored::ColoredString {
        self.type_name(ty).yellow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes() -> (TypeContext, TypeId, TypeId, TypeId) {
        let mut ctx = TypeContext::new();

        let drawable = ctx.add_interface(ClassType::new("Drawable"));

        let mut shape = ClassType::new("Shape");
        shape.extends = Some(ctx.object());
        shape.implements.push(drawable);
        let shape = ctx.add_class(shape);

        let mut circle = ClassType::new("Circle");
        circle.extends = Some(shape);
        let circle = ctx.add_class(circle);

        (ctx, drawable, shape, circle)
    }

    #[test]
    fn subtyping_follows_parents_and_interfaces() {
        let (ctx, drawable, shape, circle) = shapes();

        assert!(ctx.is_subtype(circle, shape));
        assert!(ctx.is_subtype(circle, drawable));
        assert!(ctx.is_subtype(circle, ctx.object()));
        assert!(!ctx.is_subtype(shape, circle));
        assert!(ctx.is_subtype(ctx.null(), circle));
        assert!(ctx.is_strict_supertype(shape, circle));
        assert!(!ctx.is_strict_supertype(shape, shape));
        assert!(ctx.is_subtype(ctx.int(), ctx.primitive(PrimitiveKind::Long)));
    }

    #[test]
    fn arrays_are_interned() {
        let (mut ctx, _, shape, circle) = shapes();

        let a = ctx.array_of(circle, 1);
        let b = ctx.array_of(circle, 1);
        let shapes = ctx.array_of(shape, 1);
        let grid = ctx.array_of(circle, 2);

        assert_eq!(a, b);
        assert_ne!(a, grid);
        assert!(ctx.is_subtype(a, shapes));
        assert!(!ctx.is_subtype(grid, shapes));
        assert_eq!(ctx.type_name(grid), "Circle[,]");
    }

    #[test]
    fn multiple_returns_share_one_sequence_type() {
        let (mut ctx, _, shape, circle) = shapes();
        let int = ModifiedType::new(ctx.int());
        let circle = ModifiedType::new(circle);

        let split = ctx.add_signature(
            shape,
            "split",
            SignatureKind::Method,
            Vec::new(),
            vec![int, circle],
            Modifiers::PUBLIC,
            Span::default(),
        );
        let counts = ctx.sequence_of(vec![int, int]);

        let result = ctx.signature(split).result.unwrap();
        assert_eq!(result.ty, ctx.sequence_of(vec![int, circle]));
        assert_eq!(ctx.type_name(result.ty), "(int, Circle)");
        assert_eq!(ctx.as_sequence(result.ty), Some(&[int, circle][..]));
        assert!(ctx.is_reference(result.ty));
        assert!(!ctx.is_reference(counts));
        assert!(!ctx.is_subtype(result.ty, ctx.object()));
    }

    #[test]
    fn fields_are_inherited() {
        let (mut ctx, _, shape, circle) = shapes();
        let int = ModifiedType::new(ctx.int());
        ctx.add_field(shape, "x", int);
        ctx.add_field(circle, "radius", int);

        assert_eq!(ctx.field_type(circle, "x"), Some(int));
        assert_eq!(ctx.field_type(circle, "radius"), Some(int));
        assert_eq!(ctx.field_type(shape, "radius"), None);
    }

    #[test]
    fn overloads_pick_most_specific() {
        let (mut ctx, _, shape, circle) = shapes();
        let object = ctx.object();
        let boolean = ModifiedType::new(ctx.boolean());

        let general = ctx.add_signature(
            shape,
            "equal",
            SignatureKind::Method,
            vec![ModifiedType::new(object)],
            vec![boolean],
            Modifiers::PUBLIC,
            Span::default(),
        );
        let specific = ctx.add_signature(
            shape,
            "equal",
            SignatureKind::Method,
            vec![ModifiedType::new(shape)],
            vec![boolean],
            Modifiers::PUBLIC,
            Span::default(),
        );

        assert_eq!(ctx.resolve_overload(circle, "equal", &[circle]), Ok(specific));
        assert_eq!(ctx.resolve_overload(circle, "equal", &[object]), Ok(general));
        assert!(ctx.resolve_overload(circle, "equal", &[ctx.int()]).is_err());
        assert_eq!(ctx.signature(specific).mangled_name, "Shape.equal(Shape)");
    }
}
