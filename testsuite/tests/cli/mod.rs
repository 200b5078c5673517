mod puppet_freshness;
