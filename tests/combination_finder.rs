mod common;

use std::collections::BTreeSet;

use common::{init_tracing, TeamGraph};
use penumbra::storage::MemoryGraph;
use penumbra::traversal::procedure::{Direction, EdgeKind, ThingProps, TypeProps};
use penumbra::traversal::{Combination, CombinationFinder, Identifier, Parameters, Procedure};
use penumbra::types::{Result, TraversalError, TypeId, ValueKind, Vertex};

struct Zoo {
    graph: MemoryGraph,
    animal: TypeId,
    dog: TypeId,
    cat: TypeId,
    name: TypeId,
    tag: TypeId,
}

/// `animal` is abstract and owns `name`; `dog` additionally owns `tag` as a
/// key; `person` owns `age`.
fn zoo() -> Result<Zoo> {
    let mut graph = MemoryGraph::new();
    let animal = graph.define_entity("animal")?;
    let dog = graph.define_entity("dog")?;
    let cat = graph.define_entity("cat")?;
    let person = graph.define_entity("person")?;
    let name = graph.define_attribute("name", ValueKind::String)?;
    let tag = graph.define_attribute("tag", ValueKind::Long)?;
    let age = graph.define_attribute("age", ValueKind::Long)?;
    graph.set_supertype(dog, animal)?;
    graph.set_supertype(cat, animal)?;
    graph.set_abstract(animal, true)?;
    graph.set_owns(animal, name)?;
    graph.set_owns_key(dog, tag)?;
    graph.set_owns(person, age)?;
    Ok(Zoo {
        graph,
        animal,
        dog,
        cat,
        name,
        tag,
    })
}

/// `$x owns $a; $a type <attribute>;`
fn owner_of(attribute: &str) -> Result<Procedure> {
    let mut builder = Procedure::builder();
    let x = builder.type_vertex(Identifier::name("x"), TypeProps::default());
    let a = builder.type_vertex(Identifier::name("a"), TypeProps::of_labels([attribute]));
    builder.edge(x, a, EdgeKind::Owns { key: false }, Direction::Forward);
    builder.build()
}

fn nothing() -> [Identifier; 0] {
    []
}

fn types(ids: &[TypeId]) -> BTreeSet<TypeId> {
    ids.iter().copied().collect()
}

#[test]
fn owners_are_narrowed_through_inheritance() -> Result<()> {
    init_tracing();
    let zoo = zoo()?;
    let procedure = owner_of("name")?;
    let (x, a) = (Identifier::name("x"), Identifier::name("a"));

    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone(), a.clone()], nothing())?;
    let combination = finder.combination()?.expect("name has owners");
    let expected: Combination = [
        (x.clone(), types(&[zoo.animal, zoo.dog, zoo.cat])),
        (a.clone(), types(&[zoo.name])),
    ]
    .into_iter()
    .collect();
    assert_eq!(combination, expected);

    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone(), a.clone()], [x.clone()])?;
    let combination = finder.combination()?.expect("concrete owners remain");
    assert_eq!(combination[&x], types(&[zoo.dog, zoo.cat]));
    assert_eq!(combination[&a], types(&[zoo.name]));
    Ok(())
}

#[test]
fn subtype_only_declarations_stay_with_the_subtype() -> Result<()> {
    let zoo = zoo()?;
    let procedure = owner_of("tag")?;
    let x = Identifier::name("x");
    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone()], nothing())?;
    let combination = finder.combination()?.expect("dogs own tags");
    assert_eq!(combination.len(), 1);
    assert_eq!(combination[&x], types(&[zoo.dog]));
    Ok(())
}

#[test]
fn key_ownership_narrows_to_key_declarations() -> Result<()> {
    let zoo = zoo()?;
    let (x, a) = (Identifier::name("x"), Identifier::name("a"));
    let mut builder = Procedure::builder();
    let xv = builder.type_vertex(x.clone(), TypeProps::default());
    let av = builder.type_vertex(a.clone(), TypeProps::default());
    builder.edge(xv, av, EdgeKind::Owns { key: true }, Direction::Forward);
    let procedure = builder.build()?;

    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone(), a.clone()], nothing())?;
    let combination = finder.combination()?.expect("dogs are keyed by tag");
    assert_eq!(combination[&x], types(&[zoo.dog]));
    assert_eq!(combination[&a], types(&[zoo.tag]));

    let mut builder = Procedure::builder();
    let xv = builder.type_vertex(x.clone(), TypeProps::default());
    let av = builder.type_vertex(a.clone(), TypeProps::of_labels(["name"]));
    builder.edge(xv, av, EdgeKind::Owns { key: true }, Direction::Forward);
    let procedure = builder.build()?;
    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone()], nothing())?;
    assert_eq!(finder.combination()?, None);

    let owns = procedure.edge(0);
    let params = Parameters::new();
    let name = procedure.vertex(owns.to());
    assert!(!owns.is_closure(&zoo.graph, name, Vertex::Type(zoo.dog), Vertex::Type(zoo.name), &params)?);
    Ok(())
}

#[test]
fn narrowing_flows_back_and_forth_until_stable() -> Result<()> {
    let zoo = zoo()?;
    let (x, a, b) = (Identifier::name("x"), Identifier::name("a"), Identifier::name("b"));
    let mut builder = Procedure::builder();
    let xv = builder.type_vertex(x.clone(), TypeProps::default());
    let av = builder.type_vertex(a.clone(), TypeProps::default());
    let bv = builder.type_vertex(b.clone(), TypeProps::of_labels(["tag"]));
    builder.edge(xv, av, EdgeKind::Owns { key: false }, Direction::Forward);
    builder.edge(xv, bv, EdgeKind::Owns { key: false }, Direction::Forward);
    let procedure = builder.build()?;

    // `b` pins `x` to dog, which must then shrink `a` from every owned
    // attribute to the ones dogs own.
    let finder =
        CombinationFinder::new(&zoo.graph, &procedure, [x.clone(), a.clone(), b.clone()], nothing())?;
    let combination = finder.combination()?.expect("dogs own tags");
    assert_eq!(combination[&x], types(&[zoo.dog]));
    assert_eq!(combination[&a], types(&[zoo.name, zoo.tag]));
    assert_eq!(combination[&b], types(&[zoo.tag]));
    Ok(())
}

#[test]
fn unsatisfiable_constraints_yield_none() -> Result<()> {
    let zoo = zoo()?;
    let mut builder = Procedure::builder();
    let x = builder.type_vertex(Identifier::name("x"), TypeProps::of_labels(["person"]));
    let a = builder.type_vertex(Identifier::name("a"), TypeProps::of_labels(["name"]));
    builder.edge(x, a, EdgeKind::Owns { key: false }, Direction::Forward);
    let procedure = builder.build()?;

    let finder = CombinationFinder::new(
        &zoo.graph,
        &procedure,
        [Identifier::name("x"), Identifier::name("a")],
        nothing(),
    )?;
    assert_eq!(finder.combination()?, None);
    Ok(())
}

#[test]
fn concrete_filter_can_empty_a_variable() -> Result<()> {
    let zoo = zoo()?;
    let mut builder = Procedure::builder();
    builder.type_vertex(Identifier::name("x"), TypeProps::of_labels(["animal"]));
    let procedure = builder.build()?;
    let x = Identifier::name("x");

    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone()], nothing())?;
    assert_eq!(
        finder.combination()?.map(|combination| combination[&x].clone()),
        Some(types(&[zoo.animal]))
    );
    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone()], [x.clone()])?;
    assert_eq!(finder.combination()?, None);
    Ok(())
}

#[test]
fn subtyping_propagates_in_both_directions() -> Result<()> {
    let zoo = zoo()?;
    let (x, y) = (Identifier::name("x"), Identifier::name("y"));
    let mut builder = Procedure::builder();
    let xv = builder.type_vertex(x.clone(), TypeProps::default());
    let yv = builder.type_vertex(y.clone(), TypeProps::of_labels(["animal"]));
    builder.edge(xv, yv, EdgeKind::Sub { transitive: true }, Direction::Forward);
    let procedure = builder.build()?;

    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone(), y.clone()], nothing())?;
    let combination = finder.combination()?.expect("animal has subtypes");
    assert_eq!(combination[&x], types(&[zoo.animal, zoo.dog, zoo.cat]));
    assert_eq!(combination[&y], types(&[zoo.animal]));

    let mut builder = Procedure::builder();
    let yv = builder.type_vertex(y.clone(), TypeProps::of_labels(["animal"]));
    let xv = builder.type_vertex(x.clone(), TypeProps::default());
    builder.edge(yv, xv, EdgeKind::Sub { transitive: true }, Direction::Backward);
    let procedure = builder.build()?;
    let finder = CombinationFinder::new(&zoo.graph, &procedure, [x.clone()], [x.clone()])?;
    let combination = finder.combination()?.expect("concrete subtypes exist");
    assert_eq!(combination[&x], types(&[zoo.dog, zoo.cat]));
    Ok(())
}

#[test]
fn roles_connect_relations_and_players() -> Result<()> {
    let team = TeamGraph::new()?;
    let (r, role, p) = (
        Identifier::name("r"),
        Identifier::name("role"),
        Identifier::name("p"),
    );
    let mut builder = Procedure::builder();
    let rv = builder.type_vertex(r.clone(), TypeProps::of_labels(["team"]));
    let rolev = builder.type_vertex(role.clone(), TypeProps::default());
    let pv = builder.type_vertex(p.clone(), TypeProps::default());
    builder.edge(rv, rolev, EdgeKind::Relates, Direction::Forward);
    builder.edge(rolev, pv, EdgeKind::Plays, Direction::Backward);
    let procedure = builder.build()?;

    let finder = CombinationFinder::new(&team.graph, &procedure, [role.clone(), p.clone()], nothing())?;
    let combination = finder.combination()?.expect("team roles are played");
    assert_eq!(combination[&role], types(&[team.member, team.leader]));
    assert_eq!(combination[&p], types(&[team.person]));
    assert!(!combination.contains_key(&r));
    Ok(())
}

#[test]
fn thing_vertices_are_rejected() -> Result<()> {
    let zoo = zoo()?;
    let mut builder = Procedure::builder();
    builder.thing_vertex(Identifier::name("d"), ThingProps::of_types(["dog"]));
    let procedure = builder.build()?;
    let finder = CombinationFinder::new(&zoo.graph, &procedure, [Identifier::name("d")], nothing());
    assert!(matches!(finder, Err(TraversalError::IllegalState(_))));
    Ok(())
}

#[test]
fn surviving_types_satisfy_the_constraints_they_came_through() -> Result<()> {
    let zoo = zoo()?;
    let x = Identifier::name("x");
    let mut builder = Procedure::builder();
    builder.type_vertex(x.clone(), TypeProps::default());
    let unconstrained = builder.build()?;
    let everything = CombinationFinder::new(&zoo.graph, &unconstrained, [x.clone()], nothing())?
        .combination()?
        .expect("the schema is not empty");

    let procedure = owner_of("name")?;
    let narrowed = CombinationFinder::new(&zoo.graph, &procedure, [x.clone()], nothing())?
        .combination()?
        .expect("name has owners");
    assert!(narrowed[&x].is_subset(&everything[&x]));
    assert!(narrowed[&x].len() < everything[&x].len());

    let owns = procedure.edge(0);
    let attribute = procedure.vertex(owns.to());
    let params = Parameters::new();
    for &ty in &narrowed[&x] {
        assert!(owns.is_closure(
            &zoo.graph,
            attribute,
            Vertex::Type(ty),
            Vertex::Type(zoo.name),
            &params,
        )?);
    }
    Ok(())
}
