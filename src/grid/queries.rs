//! Frozen GRID GraphQL templates. Only the variables change between calls;
//! the query text is part of the cache key, so keep it byte-stable.

pub const SERIES_BY_ID: &str = r#"
query SeriesById($id: ID!) {
  series(id: $id) {
    id
    title { nameShortened }
    tournament { nameShortened }
    startTimeScheduled
    format { name nameShortened }
    teams {
      baseInfo { id name }
      scoreAdvantage
    }
  }
}
"#;

pub const ALL_SERIES_WINDOW: &str = r#"
query GetAllSeriesInWindow($gte: String!, $lte: String!, $first: Int!) {
  allSeries(
    filter: { startTimeScheduled: { gte: $gte, lte: $lte } }
    first: $first
  ) {
    edges {
      node {
        id
        startTimeScheduled
        format { name nameShortened }
        tournament { nameShortened }
        teams { baseInfo { id name } }
      }
    }
  }
}
"#;

pub const SERIES_GAMES: &str = r#"
query SeriesGames($id: ID!) {
  series(id: $id) {
    id
    games {
      id
      status
      map { name }
      teams {
        team { id name }
        score
        side
      }
    }
  }
}
"#;

pub const GAME_TIMELINE: &str = r#"
query GameTimeline($id: ID!) {
  game(id: $id) {
    id
    map { name }
    rounds {
      number
      winner { id name }
      teams {
        team { id name }
        side
        score
        economy { credits }
      }
      events {
        type
        time
        player { id name }
        victim { id name }
        isTrade
      }
    }
  }
}
"#;

pub const PLAYER_STATISTICS: &str = r#"
query PlayerStatistics($playerId: ID!, $tournamentIds: [ID!]) {
  playerStatistics(
    playerId: $playerId
    filter: { tournamentIds: { in: $tournamentIds } }
  ) {
    id
    aggregationSeriesIds
    series { count kills { sum min max avg } }
    game {
      count
      wins { value count percentage streak { min max current } }
    }
    segment { type count deaths { sum min max avg } }
  }
}
"#;

pub const TEAM_STATISTICS: &str = r#"
query TeamStatistics($teamId: ID!, $tournamentIds: [ID!]) {
  teamStatistics(
    teamId: $teamId
    filter: { tournamentIds: { in: $tournamentIds } }
  ) {
    id
    aggregationSeriesIds
    series { count kills { sum min max avg } }
    game {
      count
      wins { value count percentage streak { min max current } }
    }
    segment { type count deaths { sum min max avg } }
  }
}
"#;
