mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{role_player, TeamGraph};
use penumbra::storage::{GraphManager, MemoryGraph, SortedCursor};
use penumbra::traversal::procedure::{Direction, EdgeKind, ThingProps};
use penumbra::traversal::scope::ScopeIndex;
use penumbra::traversal::{
    GraphIterator, Identifier, Modifiers, Order, Parameters, Procedure, Sorting,
    TraversalOptions, VertexMap,
};
use penumbra::types::{Result, ThingId, Vertex};
use proptest::prelude::*;

const NAMES: [&str; 3] = ["ada", "bo", "cy"];

#[derive(Debug, Clone)]
struct Population {
    people: Vec<BTreeSet<usize>>,
    teams: Vec<(Vec<usize>, Vec<usize>)>,
}

fn arb_population() -> impl Strategy<Value = Population> {
    (1usize..=4)
        .prop_flat_map(|people| {
            (
                prop::collection::vec(prop::collection::btree_set(0..NAMES.len(), 0..=2), people),
                prop::collection::vec(
                    (
                        prop::collection::vec(0..people, 0..=3),
                        prop::collection::vec(0..people, 0..=2),
                    ),
                    0..=3,
                ),
            )
        })
        .prop_map(|(people, teams)| Population { people, teams })
}

fn populate(population: &Population) -> Result<MemoryGraph> {
    let mut team = TeamGraph::new()?;
    let mut people = Vec::with_capacity(population.people.len());
    for names in &population.people {
        let names: Vec<&str> = names.iter().map(|&index| NAMES[index]).collect();
        people.push(team.person(&names)?);
    }
    for (members, leaders) in &population.teams {
        let members: Vec<ThingId> = members.iter().map(|&index| people[index]).collect();
        let leaders: Vec<ThingId> = leaders.iter().map(|&index| people[index]).collect();
        team.team(&members, &leaders)?;
    }
    Ok(team.graph)
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    /// `$t isa team; (member: $x, member: $y) isa $t;`
    TwoMembers,
    /// `$x isa person, has name $n; (member: $x, leader: $l) isa $t;`
    MemberAndLeader,
    /// `$x isa person, has $n; $y isa person, has $n;`
    SharedName,
    /// `$t isa team; ($x, leader: $y) isa $t;`
    AnyRoleAndLeader,
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::TwoMembers),
        Just(Shape::MemberAndLeader),
        Just(Shape::SharedName),
        Just(Shape::AnyRoleAndLeader),
    ]
}

fn build(shape: Shape, name: Identifier) -> Result<Procedure> {
    let mut builder = Procedure::builder();
    match shape {
        Shape::TwoMembers => {
            let t = builder.thing_vertex(Identifier::name("t"), ThingProps::of_types(["team"]));
            let x = builder.thing_vertex(Identifier::name("x"), ThingProps::default());
            let y = builder.thing_vertex(Identifier::name("y"), ThingProps::default());
            builder.edge(t, x, role_player(&["team:member"]), Direction::Forward);
            builder.edge(t, y, role_player(&["team:member"]), Direction::Forward);
        }
        Shape::MemberAndLeader => {
            let x = builder.thing_vertex(Identifier::name("x"), ThingProps::of_types(["person"]));
            let t = builder.thing_vertex(Identifier::name("t"), ThingProps::default());
            let l = builder.thing_vertex(Identifier::name("l"), ThingProps::default());
            let n = builder.thing_vertex(name, ThingProps::default());
            builder.edge(x, t, role_player(&["team:member"]), Direction::Backward);
            builder.edge(t, l, role_player(&["team:leader"]), Direction::Forward);
            builder.edge(x, n, EdgeKind::Has, Direction::Forward);
        }
        Shape::SharedName => {
            let x = builder.thing_vertex(Identifier::name("x"), ThingProps::of_types(["person"]));
            let y = builder.thing_vertex(Identifier::name("y"), ThingProps::of_types(["person"]));
            let n = builder.thing_vertex(name, ThingProps::default());
            builder.edge(x, n, EdgeKind::Has, Direction::Forward);
            builder.edge(y, n, EdgeKind::Has, Direction::Forward);
        }
        Shape::AnyRoleAndLeader => {
            let t = builder.thing_vertex(Identifier::name("t"), ThingProps::of_types(["team"]));
            let x = builder.thing_vertex(Identifier::name("x"), ThingProps::default());
            let y = builder.thing_vertex(Identifier::name("y"), ThingProps::default());
            builder.edge(t, x, role_player(&[]), Direction::Forward);
            builder.edge(t, y, role_player(&["team:leader"]), Direction::Forward);
        }
    }
    builder.build()
}

/// Exhaustive search over every assignment of things to vertices.
struct Oracle<'a> {
    graph: &'a MemoryGraph,
    procedure: &'a Procedure,
    params: &'a Parameters,
    things: Vec<Vertex>,
}

impl<'a> Oracle<'a> {
    fn new(graph: &'a MemoryGraph, procedure: &'a Procedure, params: &'a Parameters) -> Result<Self> {
        let mut things = Vec::new();
        let mut types = graph.all_types()?;
        while let Some(ty) = types.next()? {
            let mut instances = graph.instances(ty)?;
            while let Some(thing) = instances.next()? {
                things.push(Vertex::Thing(thing));
            }
        }
        Ok(Self {
            graph,
            procedure,
            params,
            things,
        })
    }

    fn answers(&self, filter: &BTreeSet<Identifier>) -> Result<BTreeSet<VertexMap>> {
        let mut assignment = vec![None; self.procedure.vertex_count()];
        let mut out = BTreeSet::new();
        self.extend(&mut assignment, 0, filter, &mut out)?;
        Ok(out)
    }

    fn extend(
        &self,
        assignment: &mut [Option<Vertex>],
        depth: usize,
        filter: &BTreeSet<Identifier>,
        out: &mut BTreeSet<VertexMap>,
    ) -> Result<()> {
        if depth == assignment.len() {
            let bound: Vec<Vertex> = assignment.iter().flatten().copied().collect();
            if self.roles_assignable(&bound)? {
                let bindings = self
                    .procedure
                    .vertices()
                    .iter()
                    .filter(|vertex| vertex.id().is_retrievable() && filter.contains(vertex.id()))
                    .map(|vertex| (vertex.id().clone(), bound[vertex.order()]))
                    .collect();
                out.insert(VertexMap::new(bindings));
            }
            return Ok(());
        }
        let vertex = self.procedure.vertex(depth);
        for &candidate in &self.things {
            if !vertex.accepts(self.graph, candidate, self.params)? {
                continue;
            }
            assignment[depth] = Some(candidate);
            if self.edges_into_hold(assignment, depth)? {
                self.extend(assignment, depth + 1, filter, out)?;
            }
        }
        assignment[depth] = None;
        Ok(())
    }

    fn edges_into_hold(&self, assignment: &[Option<Vertex>], depth: usize) -> Result<bool> {
        for edge in self.procedure.edges().iter().filter(|edge| edge.to() == depth) {
            let (Some(from), Some(to)) = (assignment[edge.from()], assignment[edge.to()]) else {
                return Ok(false);
            };
            let target = self.procedure.vertex(edge.to());
            if !edge.is_closure(self.graph, target, from, to, self.params)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether every scope can give its role-player edges distinct role
    /// instances.
    fn roles_assignable(&self, bound: &[Vertex]) -> Result<bool> {
        let mut per_scope: BTreeMap<ScopeIndex, Vec<Vec<ThingId>>> = BTreeMap::new();
        for edge in self.procedure.edges() {
            let Some(scope) = edge.scope() else { continue };
            let target = self.procedure.vertex(edge.to());
            let branch =
                edge.role_player_branch(self.graph, target, bound[edge.from()], self.params)?;
            per_scope
                .entry(scope)
                .or_default()
                .push(branch.roles(bound[edge.to()]).collect());
        }
        Ok(per_scope
            .values()
            .all(|lists| distinct_choice(lists, &mut Vec::new())))
    }
}

fn distinct_choice(lists: &[Vec<ThingId>], used: &mut Vec<ThingId>) -> bool {
    let Some((first, rest)) = lists.split_first() else {
        return true;
    };
    for &role in first {
        if used.contains(&role) {
            continue;
        }
        used.push(role);
        let found = distinct_choice(rest, used);
        used.pop();
        if found {
            return true;
        }
    }
    false
}

fn run(
    graph: &MemoryGraph,
    procedure: &Procedure,
    filter: &BTreeSet<Identifier>,
    sorting: Sorting,
    options: TraversalOptions,
) -> Result<Vec<VertexMap>> {
    let params = Parameters::new();
    let modifiers = Modifiers::new(filter.iter().cloned()).with_sorting(sorting);
    let answers = GraphIterator::with_options(graph, None, procedure, &params, modifiers, options)?
        .collect::<Result<Vec<_>>>();
    answers
}

fn all_named(procedure: &Procedure) -> BTreeSet<Identifier> {
    procedure
        .vertices()
        .iter()
        .map(|vertex| vertex.id().clone())
        .filter(Identifier::is_retrievable)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_answers_match_exhaustive_search(
        population in arb_population(),
        shape in arb_shape(),
        short_circuit in any::<bool>(),
        descending in prop::option::of(0usize..3),
    ) {
        let graph = populate(&population).unwrap();
        let procedure = build(shape, Identifier::name("n")).unwrap();
        let filter = all_named(&procedure);
        let params = Parameters::new();
        let expected = Oracle::new(&graph, &procedure, &params).unwrap().answers(&filter).unwrap();

        let sorting = match descending {
            Some(order) => Sorting::new(vec![(procedure.vertex(order).id().clone(), Order::Desc)]),
            None => Sorting::default(),
        };
        let options = TraversalOptions::default().short_circuit(short_circuit);
        let answers = run(&graph, &procedure, &filter, sorting, options).unwrap();

        let distinct: BTreeSet<VertexMap> = answers.iter().cloned().collect();
        prop_assert_eq!(distinct.len(), answers.len(), "full answers repeat");
        prop_assert_eq!(distinct, expected);
        prop_assert_eq!(graph.cursor_stats().open(), 0);
    }

    #[test]
    fn prop_projected_answers_match_exhaustive_search(
        population in arb_population(),
        single_answer_leaves in any::<bool>(),
        short_circuit in any::<bool>(),
    ) {
        let graph = populate(&population).unwrap();
        let procedure = build(Shape::MemberAndLeader, Identifier::anon(0)).unwrap();
        let filter: BTreeSet<Identifier> = ["x", "l"].into_iter().map(Identifier::name).collect();
        let params = Parameters::new();
        let expected = Oracle::new(&graph, &procedure, &params).unwrap().answers(&filter).unwrap();

        let options = TraversalOptions::default()
            .single_answer_leaves(single_answer_leaves)
            .short_circuit(short_circuit);
        let answers = run(&graph, &procedure, &filter, Sorting::default(), options).unwrap();
        let distinct: BTreeSet<VertexMap> = answers.into_iter().collect();
        prop_assert_eq!(distinct, expected);
    }
}
